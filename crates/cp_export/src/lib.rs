use printpdf::{BuiltinFont, Color, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, Pt, Rgb};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use cp_core::{Article, DocumentRenderer, Error, ExportArtifact, Result};

pub mod layout;

use layout::{Charset, Face, PAGE_HEIGHT, PAGE_WIDTH};

/// Renders an article as a US Letter PDF report.
///
/// By default the built-in Helvetica faces are used, which cover the
/// WinAnsi character set. With [`PdfRenderer::with_font_file`] a TrueType
/// font is embedded instead and any character it has glyphs for survives.
#[derive(Clone, Default)]
pub struct PdfRenderer {
    font: Option<Arc<Vec<u8>>>,
}

impl fmt::Debug for PdfRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PdfRenderer")
            .field("font_bytes", &self.font.as_ref().map(|font| font.len()))
            .finish()
    }
}

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    oblique: IndirectFontRef,
}

impl PdfRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Embed the TrueType font at `path` for every face.
    pub fn with_font_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| Error::Configuration(format!("Cannot read font {}: {}", path.display(), e)))?;
        tracing::info!("🔤 Embedding font {} in reports", path.display());
        Ok(Self { font: Some(Arc::new(bytes)) })
    }

    pub fn charset(&self) -> Charset {
        if self.font.is_some() {
            Charset::Unicode
        } else {
            Charset::WinAnsi
        }
    }

    fn fonts(&self, doc: &PdfDocumentReference) -> Result<Fonts> {
        match &self.font {
            Some(bytes) => {
                let font = doc.add_external_font(bytes.as_slice()).map_err(pdf_error)?;
                Ok(Fonts { regular: font.clone(), bold: font.clone(), oblique: font })
            }
            None => Ok(Fonts {
                regular: doc.add_builtin_font(BuiltinFont::Helvetica).map_err(pdf_error)?,
                bold: doc.add_builtin_font(BuiltinFont::HelveticaBold).map_err(pdf_error)?,
                oblique: doc.add_builtin_font(BuiltinFont::HelveticaOblique).map_err(pdf_error)?,
            }),
        }
    }

    /// Render and wrap the bytes with the download metadata.
    pub fn export(&self, article: &Article) -> Result<ExportArtifact> {
        Ok(ExportArtifact::pdf(article, self.render(article)?))
    }
}

fn pdf_error(e: impl std::fmt::Display) -> Error {
    Error::Export(format!("PDF rendering failed: {}", e))
}

impl DocumentRenderer for PdfRenderer {
    fn render(&self, article: &Article) -> Result<Vec<u8>> {
        let charset = self.charset();
        let pages = layout::layout(article, charset);
        let width = Mm::from(Pt(PAGE_WIDTH));
        let height = Mm::from(Pt(PAGE_HEIGHT));

        let (doc, first_page, first_layer) =
            PdfDocument::new(layout::sanitize(&article.title, charset), width, height, "Layer 1".to_string());
        let fonts = self.fonts(&doc)?;

        for (index, lines) in pages.iter().enumerate() {
            let (page, layer) = if index == 0 {
                (first_page, first_layer)
            } else {
                doc.add_page(width, height, format!("Page {}, Layer 1", index + 1))
            };
            let layer = doc.get_page(page).get_layer(layer);
            for line in lines {
                let font: &IndirectFontRef = match line.style.face {
                    Face::Regular => &fonts.regular,
                    Face::Bold => &fonts.bold,
                    Face::Oblique => &fonts.oblique,
                };
                let (r, g, b) = line.style.rgb;
                layer.set_fill_color(Color::Rgb(Rgb::new(r, g, b, None)));
                layer.use_text(
                    line.text.clone(),
                    line.style.size,
                    Mm::from(Pt(line.x)),
                    Mm::from(Pt(line.y)),
                    font,
                );
            }
        }

        let bytes = doc.save_to_bytes().map_err(pdf_error)?;
        tracing::debug!("📄 Rendered '{}' into {} pages ({} bytes)", article.title, pages.len(), bytes.len());
        Ok(bytes)
    }
}
