#![forbid(unsafe_code)]

use certiwipe_contracts::certificate::{CertificatePayload, VerificationSummary};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream, StringFormat};

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;
const MARGIN_LEFT: i64 = 56;
const TOP: i64 = 780;
const LINE_HEIGHT: i64 = 16;
const WRAP_COLUMNS: usize = 88;

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("pdf encoding failed: {0}")]
    Encode(String),
    #[error("summary serialization failed: {0}")]
    Summary(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedArtifact {
    pub content_type: &'static str,
    pub extension: &'static str,
    pub bytes: Vec<u8>,
}

/// Produces the human-facing certificate document for one issuance.
pub trait ArtifactRenderer: Send + Sync {
    fn render(
        &self,
        payload: &CertificatePayload,
        summary: &VerificationSummary,
    ) -> Result<RenderedArtifact, ArtifactError>;
}

/// Single-page A4 certificate. The curated summary JSON is printed at the
/// bottom so the document can be checked without the scannable code.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfCertificateRenderer;

impl ArtifactRenderer for PdfCertificateRenderer {
    fn render(
        &self,
        payload: &CertificatePayload,
        summary: &VerificationSummary,
    ) -> Result<RenderedArtifact, ArtifactError> {
        let lines = certificate_lines(payload, summary)?;
        let bytes = build_pdf(&payload.certificate_id, &lines)?;
        Ok(RenderedArtifact {
            content_type: PDF_CONTENT_TYPE,
            extension: "pdf",
            bytes,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Title(String),
    Heading(String),
    Body(String),
    Mono(String),
    Gap,
}

fn certificate_lines(
    payload: &CertificatePayload,
    summary: &VerificationSummary,
) -> Result<Vec<Line>, ArtifactError> {
    let device = &summary.device_info;
    let wipe = &summary.wipe_details;
    let mut lines = vec![
        Line::Title("Certificate of Data Erasure".to_string()),
        Line::Body(format!("Certificate ID: {}", payload.certificate_id)),
        Line::Body(format!("Completed: {}", payload.wipe_details.end_time)),
        Line::Gap,
        Line::Heading("Device".to_string()),
        Line::Body(format!("Model: {}", device.model)),
        Line::Body(format!("Serial number: {}", device.serial_number)),
        Line::Body(format!("IMEI: {}", payload.device_info.imei)),
        Line::Body(format!("Storage: {}", device.storage_gb)),
        Line::Gap,
        Line::Heading("Erasure".to_string()),
        Line::Body(format!("Method: {}", wipe.method)),
        Line::Body(format!("Compliance: {}", wipe.compliance)),
        Line::Body(format!("Passes: {}", wipe.passes)),
        Line::Body(format!("Duration: {}", wipe.duration_minutes)),
        Line::Body(format!("HPA/DCO erased: {}", wipe.hpa_dco_erased)),
        Line::Gap,
        Line::Heading("Verification".to_string()),
        Line::Body(format!("Result: {}", summary.verification.final_hash)),
        Line::Body(format!("Digest: {}", summary.verification.algorithm)),
        Line::Gap,
        Line::Heading("Verification payload".to_string()),
    ];
    let summary_json = serde_json::to_string(summary)?;
    lines.extend(wrap(&summary_json, WRAP_COLUMNS).into_iter().map(Line::Mono));
    Ok(lines)
}

fn wrap(text: &str, columns: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(columns.max(1))
        .map(|chunk| chunk.iter().collect())
        .collect()
}

/// Base-14 fonts only cover Latin-1; anything else is replaced.
fn pdf_text(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c as u8 } else { b'?' })
        .collect()
}

fn text_op(font: &str, size: i64, y: i64, text: &str) -> Vec<Operation> {
    vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec![Object::Name(font.as_bytes().to_vec()), Object::Integer(size)]),
        Operation::new("Td", vec![Object::Integer(MARGIN_LEFT), Object::Integer(y)]),
        Operation::new(
            "Tj",
            vec![Object::String(pdf_text(text), StringFormat::Literal)],
        ),
        Operation::new("ET", vec![]),
    ]
}

fn build_pdf(title: &str, lines: &[Line]) -> Result<Vec<u8>, ArtifactError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let regular = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let bold = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
    });
    let mono = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => Object::Reference(regular),
            "F2" => Object::Reference(bold),
            "F3" => Object::Reference(mono),
        },
    });

    let mut operations = Vec::new();
    let mut y = TOP;
    for line in lines {
        match line {
            Line::Title(text) => {
                operations.extend(text_op("F2", 20, y, text));
                y -= LINE_HEIGHT * 2;
            }
            Line::Heading(text) => {
                operations.extend(text_op("F2", 13, y, text));
                y -= LINE_HEIGHT;
            }
            Line::Body(text) => {
                operations.extend(text_op("F1", 11, y, text));
                y -= LINE_HEIGHT;
            }
            Line::Mono(text) => {
                operations.extend(text_op("F3", 8, y, text));
                y -= LINE_HEIGHT - 5;
            }
            Line::Gap => y -= LINE_HEIGHT / 2,
        }
    }
    let content = Content { operations }
        .encode()
        .map_err(|e| ArtifactError::Encode(e.to_string()))?;
    let content_id = doc.add_object(Stream::new(dictionary! {}, content));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => Object::Reference(pages_id),
        "Contents" => Object::Reference(content_id),
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => Object::Integer(1),
            "Resources" => Object::Reference(resources_id),
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(PAGE_WIDTH),
                Object::Integer(PAGE_HEIGHT),
            ],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_id),
    });
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::String(pdf_text(title), StringFormat::Literal),
        "Producer" => Object::String(b"certiwipe".to_vec(), StringFormat::Literal),
    });
    doc.trailer.set("Root", Object::Reference(catalog_id));
    doc.trailer.set("Info", Object::Reference(info_id));
    doc.compress();

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| ArtifactError::Encode(e.to_string()))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary::verification_summary;
    use serde_json::json;

    fn payload() -> CertificatePayload {
        CertificatePayload::from_value(&json!({
            "certificate_id": "CERT-1700000000000-AB12",
            "device_info": {"model": "Pixel 7", "serial": "SN-77", "imei": "123456789012345", "size_bytes": 137438953472u64},
            "wipe_details": {
                "method": "NIST-800-88, 1 pass", "compliance": "NIST SP 800-88 Rev.1",
                "passes": 1, "duration_seconds": 1800, "hpa_removed": true,
                "end_time": "2024-05-01T10:00:00Z"
            },
            "verification": {"result": "PASSED"}
        }))
        .unwrap()
    }

    #[test]
    fn at_artifact_01_renders_a_loadable_single_page_pdf() {
        let payload = payload();
        let rendered = PdfCertificateRenderer
            .render(&payload, &verification_summary(&payload))
            .unwrap();
        assert_eq!(rendered.content_type, PDF_CONTENT_TYPE);
        assert!(rendered.bytes.starts_with(b"%PDF-1.5"));
        let doc = Document::load_mem(&rendered.bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn at_artifact_02_lines_embed_summary_json() {
        let payload = payload();
        let summary = verification_summary(&payload);
        let lines = certificate_lines(&payload, &summary).unwrap();
        let mono: String = lines
            .iter()
            .filter_map(|l| match l {
                Line::Mono(s) => Some(s.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(mono, serde_json::to_string(&summary).unwrap());
        assert!(lines.contains(&Line::Body("Storage: 128.00 GB".to_string())));
        assert!(lines.contains(&Line::Body("HPA/DCO erased: Yes".to_string())));
    }

    #[test]
    fn at_artifact_03_non_latin_text_is_replaced() {
        assert_eq!(pdf_text("Größe ✓"), b"Gr??e ?".to_vec());
        assert_eq!(wrap("abcdef", 4), vec!["abcd".to_string(), "ef".to_string()]);
    }
}
