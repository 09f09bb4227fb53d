pub mod lookups;

pub use lookups::{create_lookup, ScriptedLookup, WikipediaLookup};

pub mod prelude {
    pub use super::lookups::{ScriptedLookup, WikipediaLookup};
    pub use cp_core::{Article, EncyclopediaLookup, Error, LookupMode, LookupOutcome, Result};
}
