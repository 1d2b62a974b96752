use std::io::Cursor;
use std::path::Path;

use async_trait::async_trait;
use calamine::Reader;
use serde_json::{Map, Value};

use super::splitter::RecursiveCharacterSplitter;
use crate::core::errors::ApiError;

/// Upload extensions the HTTP surface accepts at all. Anything else is a 415.
pub const ACCEPTED_EXTENSIONS: [&str; 6] = ["pdf", "docx", "txt", "csv", "xlsx", "md"];

/// Ordered text span produced by a loader, before metadata stamping.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedChunk {
    pub text: String,
    pub metadata: Map<String, Value>,
}

#[async_trait]
pub trait DocumentLoader: Send + Sync {
    fn supports(&self, extension: &str) -> bool;

    async fn load(&self, path: &Path) -> Result<Vec<LoadedChunk>, ApiError>;
}

pub fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

pub fn is_accepted_upload(name: &str) -> bool {
    extension_of(name)
        .map(|ext| ACCEPTED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Loads every accepted upload type. Plain text is decoded lossily, PDF,
/// DOCX and XLSX go through their parsers before splitting.
#[derive(Debug, Clone, Default)]
pub struct FileDocumentLoader {
    splitter: RecursiveCharacterSplitter,
}

impl FileDocumentLoader {
    pub fn new(splitter: RecursiveCharacterSplitter) -> Self {
        Self { splitter }
    }
}

#[async_trait]
impl DocumentLoader for FileDocumentLoader {
    fn supports(&self, extension: &str) -> bool {
        ACCEPTED_EXTENSIONS.contains(&extension.to_ascii_lowercase().as_str())
    }

    async fn load(&self, path: &Path) -> Result<Vec<LoadedChunk>, ApiError> {
        let path_label = path.display().to_string();
        let extension = match extension_of(&path_label) {
            Some(ext) if self.supports(&ext) => ext,
            _ => {
                return Err(ApiError::Validation(format!(
                    "Unsupported document type: {}",
                    path_label
                )))
            }
        };

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ApiError::Validation(format!("Cannot read {}: {}", path_label, e)))?;
        let text = extract_text(&extension, bytes, &path_label).await?;
        if text.trim().is_empty() {
            return Err(ApiError::Validation(format!(
                "No text content could be extracted from {}",
                path_label
            )));
        }

        let chunks = self
            .splitter
            .split_with_offsets(&text)
            .into_iter()
            .map(|span| {
                let mut metadata = Map::new();
                metadata.insert("file_path".to_string(), Value::String(path_label.clone()));
                metadata.insert("start_index".to_string(), Value::from(span.start_index));
                LoadedChunk {
                    text: span.text,
                    metadata,
                }
            })
            .collect::<Vec<_>>();

        tracing::debug!("Loaded {} chunk(s) from {}", chunks.len(), path_label);
        Ok(chunks)
    }
}

/// Parsers are synchronous and can be slow on large files, so they run on
/// the blocking pool.
async fn extract_text(extension: &str, bytes: Vec<u8>, label: &str) -> Result<String, ApiError> {
    let extension = extension.to_string();
    let parsed = tokio::task::spawn_blocking(move || match extension.as_str() {
        "pdf" => pdf_text(&bytes),
        "docx" => docx_text(&bytes),
        "xlsx" => xlsx_text(&bytes),
        _ => Ok(String::from_utf8_lossy(&bytes).into_owned()),
    })
    .await
    .map_err(|e| ApiError::Validation(format!("Parser for {} aborted: {}", label, e)))?;
    parsed.map_err(|reason| ApiError::Validation(format!("Cannot parse {}: {}", label, reason)))
}

fn pdf_text(bytes: &[u8]) -> Result<String, String> {
    let raw = pdf_extract::extract_text_from_mem(bytes).map_err(|e| e.to_string())?;
    Ok(raw
        .replace('\0', "")
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n"))
}

fn docx_text(bytes: &[u8]) -> Result<String, String> {
    let doc = docx_rs::read_docx(bytes).map_err(|e| e.to_string())?;
    let mut content = String::new();
    for child in doc.document.children {
        if let docx_rs::DocumentChild::Paragraph(paragraph) = child {
            for child in paragraph.children {
                if let docx_rs::ParagraphChild::Run(run) = child {
                    for child in run.children {
                        if let docx_rs::RunChild::Text(text) = child {
                            content.push_str(&text.text);
                        }
                    }
                }
            }
            content.push('\n');
        }
    }
    Ok(content)
}

fn xlsx_text(bytes: &[u8]) -> Result<String, String> {
    let mut workbook =
        calamine::open_workbook_auto_from_rs(Cursor::new(bytes)).map_err(|e| e.to_string())?;
    let mut content = String::new();
    for sheet in workbook.sheet_names().to_vec() {
        let range = match workbook.worksheet_range(&sheet) {
            Ok(range) => range,
            Err(e) => {
                tracing::warn!("Skipping unreadable sheet '{}': {}", sheet, e);
                continue;
            }
        };
        content.push_str(&format!("Sheet: {}\n", sheet));
        for row in range.rows() {
            let cells: Vec<String> = row
                .iter()
                .map(|cell| match cell {
                    calamine::Data::String(s) => s.clone(),
                    calamine::Data::Float(f) => f.to_string(),
                    calamine::Data::Int(i) => i.to_string(),
                    calamine::Data::Bool(b) => b.to_string(),
                    calamine::Data::DateTime(dt) => dt.to_string(),
                    _ => String::new(),
                })
                .collect();
            if cells.iter().any(|cell| !cell.is_empty()) {
                content.push_str(&cells.join(" | "));
                content.push('\n');
            }
        }
        content.push('\n');
    }
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn text_files_are_split_with_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.md");
        tokio::fs::write(&path, "Leave policy\n\nTwenty days per year.")
            .await
            .unwrap();

        let loader = FileDocumentLoader::new(RecursiveCharacterSplitter::new(25, 0));
        let chunks = loader.load(&path).await.unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "Leave policy");
        assert_eq!(chunks[1].metadata["start_index"], Value::from(14));
        assert_eq!(
            chunks[0].metadata["file_path"],
            Value::String(path.display().to_string())
        );
    }

    #[tokio::test]
    async fn docx_paragraphs_become_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("handbook.docx");
        let mut buffer = Cursor::new(Vec::new());
        docx_rs::Docx::new()
            .add_paragraph(
                docx_rs::Paragraph::new()
                    .add_run(docx_rs::Run::new().add_text("Parking is on level 2.")),
            )
            .build()
            .pack(&mut buffer)
            .unwrap();
        tokio::fs::write(&path, buffer.into_inner()).await.unwrap();

        let chunks = FileDocumentLoader::default().load(&path).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Parking is on level 2.");
    }

    #[tokio::test]
    async fn corrupt_binary_documents_are_validation_errors() {
        let dir = tempfile::tempdir().unwrap();
        let loader = FileDocumentLoader::default();
        for (name, bytes) in [
            ("scan.pdf", b"%PDF-1.7 truncated".as_slice()),
            ("letter.docx", b"not a zip archive".as_slice()),
            ("budget.xlsx", b"not a workbook".as_slice()),
        ] {
            let path = dir.path().join(name);
            tokio::fs::write(&path, bytes).await.unwrap();
            assert!(
                matches!(loader.load(&path).await, Err(ApiError::Validation(_))),
                "{} should be rejected",
                name
            );
        }
    }

    #[tokio::test]
    async fn blank_and_unknown_files_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let loader = FileDocumentLoader::default();

        let blank = dir.path().join("empty.txt");
        tokio::fs::write(&blank, "  \n ").await.unwrap();
        assert!(matches!(
            loader.load(&blank).await,
            Err(ApiError::Validation(_))
        ));

        let binary = dir.path().join("tool.exe");
        tokio::fs::write(&binary, b"MZ").await.unwrap();
        assert!(!loader.supports("exe"));
        assert!(matches!(
            loader.load(&binary).await,
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn accepted_uploads_are_case_insensitive() {
        assert!(is_accepted_upload("Report.PDF"));
        assert!(is_accepted_upload("notes.md"));
        assert!(!is_accepted_upload("archive.zip"));
        assert!(!is_accepted_upload("README"));
        assert_eq!(extension_of("a.TXT").as_deref(), Some("txt"));
        assert!(FileDocumentLoader::default().supports("XLSX"));
    }
}
