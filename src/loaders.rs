//! Lectores de documentos por tipo de fichero.
//!
//! Cada extensión soportada (`pdf`, `txt`, `docx`, `xls`, `xlsx`) tiene un
//! `DocumentLoader` registrado en `LoaderRegistry`; cualquier otra extensión
//! es `IngestError::UnsupportedFormat`.

use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::Path;

use calamine::{open_workbook_auto, Reader as _};
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::warn;

use crate::{error::IngestError, models::Page};

/// Extrae el texto de un fichero como una secuencia de páginas.
pub trait DocumentLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Vec<Page>, IngestError>;
}

/// PDF vía `pdf-extract`. Cada salto de página (form feed) separa una página.
pub struct PdfLoader;

impl DocumentLoader for PdfLoader {
    fn load(&self, path: &Path) -> Result<Vec<Page>, IngestError> {
        let content = pdf_extract::extract_text(path)
            .map_err(|e| IngestError::load(path.display().to_string(), e))?;
        Ok(split_form_feeds(&content))
    }
}

/// Una página por cada tramo entre form feeds; las páginas en blanco se
/// descartan pero conservan su número.
fn split_form_feeds(content: &str) -> Vec<Page> {
    content
        .split('\u{c}')
        .enumerate()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(i, text)| Page::new(i + 1, text))
        .collect()
}

/// Texto plano. Si el fichero no es UTF-8 válido se lee con pérdidas.
pub struct TextLoader;

impl DocumentLoader for TextLoader {
    fn load(&self, path: &Path) -> Result<Vec<Page>, IngestError> {
        let bytes = fs::read(path)?;
        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(err) => {
                warn!("{} no es UTF-8 válido, se lee con pérdidas", path.display());
                String::from_utf8_lossy(err.as_bytes()).into_owned()
            }
        };
        Ok(vec![Page::new(1, text)])
    }
}

/// Word (.docx): texto de los párrafos de `word/document.xml`.
pub struct DocxLoader;

impl DocumentLoader for DocxLoader {
    fn load(&self, path: &Path) -> Result<Vec<Page>, IngestError> {
        let file = fs::File::open(path)?;
        let mut archive = zip::ZipArchive::new(file)
            .map_err(|e| IngestError::load(path.display().to_string(), e))?;

        let mut xml = String::new();
        archive
            .by_name("word/document.xml")
            .map_err(|e| IngestError::load(path.display().to_string(), e))?
            .read_to_string(&mut xml)?;

        let text = docx_paragraphs(&xml)
            .map_err(|e| IngestError::load(path.display().to_string(), e))?
            .join("\n\n");
        Ok(vec![Page::new(1, text)])
    }
}

/// Recorre el XML de WordprocessingML y devuelve los párrafos no vacíos.
fn docx_paragraphs(xml: &str) -> Result<Vec<String>, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(false);

    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) if e.name().as_ref() == b"w:t" => in_text = true,
            Event::End(e) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:p" => {
                    let paragraph = current.trim();
                    if !paragraph.is_empty() {
                        paragraphs.push(paragraph.to_string());
                    }
                    current.clear();
                }
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"w:tab" => current.push('\t'),
                b"w:br" => current.push('\n'),
                _ => {}
            },
            Event::Text(e) if in_text => current.push_str(&e.unescape()?),
            Event::Eof => break,
            _ => {}
        }
    }

    let tail = current.trim();
    if !tail.is_empty() {
        paragraphs.push(tail.to_string());
    }
    Ok(paragraphs)
}

/// Excel (.xls / .xlsx) vía `calamine`: una página por hoja, filas
/// separadas por salto de línea y celdas por tabulador.
pub struct ExcelLoader;

impl DocumentLoader for ExcelLoader {
    fn load(&self, path: &Path) -> Result<Vec<Page>, IngestError> {
        let mut workbook = open_workbook_auto(path)
            .map_err(|e| IngestError::load(path.display().to_string(), e))?;

        let sheet_names = workbook.sheet_names().to_owned();
        let mut pages = Vec::with_capacity(sheet_names.len());

        for (i, name) in sheet_names.iter().enumerate() {
            let range = workbook
                .worksheet_range(name)
                .map_err(|e| IngestError::load(format!("{}#{name}", path.display()), e))?;

            let rows: Vec<String> = range
                .rows()
                .map(|row| {
                    row.iter()
                        .map(|cell| cell.to_string())
                        .collect::<Vec<_>>()
                        .join("\t")
                        .trim_end()
                        .to_string()
                })
                .filter(|row| !row.is_empty())
                .collect();

            if !rows.is_empty() {
                pages.push(Page::new(i + 1, rows.join("\n")));
            }
        }

        Ok(pages)
    }
}

/// Tabla extensión → lector. Se consulta una vez por fichero.
pub struct LoaderRegistry {
    loaders: HashMap<&'static str, Box<dyn DocumentLoader>>,
}

impl Default for LoaderRegistry {
    fn default() -> Self {
        let mut registry = Self {
            loaders: HashMap::new(),
        };
        registry.register("pdf", Box::new(PdfLoader));
        registry.register("txt", Box::new(TextLoader));
        registry.register("docx", Box::new(DocxLoader));
        registry.register("xls", Box::new(ExcelLoader));
        registry.register("xlsx", Box::new(ExcelLoader));
        registry
    }
}

impl LoaderRegistry {
    pub fn register(&mut self, extension: &'static str, loader: Box<dyn DocumentLoader>) {
        self.loaders.insert(extension, loader);
    }

    /// Busca el lector a partir del nombre del documento (no de la ruta temporal).
    pub fn for_file(&self, file_name: &str) -> Result<&dyn DocumentLoader, IngestError> {
        let extension = extension_of(file_name)
            .ok_or_else(|| IngestError::UnsupportedFormat(file_name.to_string()))?;

        self.loaders
            .get(extension.as_str())
            .map(|loader| loader.as_ref())
            .ok_or_else(|| IngestError::UnsupportedFormat(file_name.to_string()))
    }

    pub fn supports(&self, file_name: &str) -> bool {
        self.for_file(file_name).is_ok()
    }
}

/// Extensión en minúsculas, sin el punto.
pub fn extension_of(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(std::ffi::OsStr::to_str)
        .map(|ext| ext.to_lowercase())
}
