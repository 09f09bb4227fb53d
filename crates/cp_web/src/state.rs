use minijinja::Environment;
use std::sync::Arc;
use cp_core::{Error, Result};
use cp_session::{SessionController, SessionStore};

pub struct AppState {
    pub controller: Arc<SessionController>,
    pub sessions: Arc<SessionStore>,
    pub templates: Environment<'static>,
}

impl AppState {
    pub fn new(controller: Arc<SessionController>, sessions: Arc<SessionStore>) -> Result<Self> {
        let mut templates = Environment::new();
        templates
            .add_template("page.html", include_str!("../templates/page.html"))
            .map_err(|e| Error::Configuration(format!("Invalid page template: {}", e)))?;
        Ok(Self { controller, sessions, templates })
    }
}
