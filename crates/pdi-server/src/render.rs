use chrono::{TimeZone, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::RgbImage;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use pdi_model::{report_file_name, Draft};
use pdi_store::StorageLayout;
use std::fmt::{Display, Formatter};
use std::io::Cursor;
use tracing::warn;

/// Every embedded photo is normalized to this letterboxed frame.
pub const IMAGE_FRAME_W: u32 = 300;
pub const IMAGE_FRAME_H: u32 = 225;

/// Printed for an absent required field and for a photo slot whose file is
/// gone or undecodable.
pub const MISSING_PLACEHOLDER: &str = "** MISSING **";

/// Fields every inspection report must show, even when left blank.
const REQUIRED_FIELDS: [&str; 4] = ["booking_id", "customer_name", "car", "inspection_date"];

const PAGE_W: f32 = 595.0;
const PAGE_H: f32 = 842.0;
const MARGIN: f32 = 50.0;
const LINE_H: f32 = 14.0;
const TITLE_SIZE: f32 = 16.0;
const BODY_SIZE: f32 = 10.0;
const JPEG_QUALITY: u8 = 80;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    Encode(String),
    Io(String),
}

impl Display for RenderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Encode(msg) => write!(f, "pdf encoding failed: {msg}"),
            Self::Io(msg) => write!(f, "render i/o failure: {msg}"),
        }
    }
}

impl std::error::Error for RenderError {}

#[derive(Debug, Clone)]
pub struct RenderedReport {
    pub file_name: String,
    pub bytes: Vec<u8>,
    /// Per-image problems (missing file, decode failure); the report is
    /// still produced with placeholders in those slots.
    pub warnings: Vec<String>,
}

/// Renders one draft into a complete inspection PDF.
///
/// Output bytes are deterministic for identical inputs and `generated_at`;
/// only the generated file name varies between calls. Content streams are
/// stored uncompressed and photos are embedded as JPEG XObjects.
#[derive(Debug, Clone)]
pub struct ReportRenderer {
    layout: StorageLayout,
}

enum Slot {
    Image { name: String },
    Placeholder,
}

impl ReportRenderer {
    #[must_use]
    pub fn new(layout: StorageLayout) -> Self {
        Self { layout }
    }

    pub fn render(&self, draft: &Draft, generated_at: i64) -> Result<RenderedReport, RenderError> {
        let mut warnings = Vec::new();

        let mut photos: Vec<(String, Slot, Option<Vec<u8>>)> = Vec::new();
        for (field, rel) in &draft.images {
            match self.load_letterboxed_jpeg(rel) {
                Ok(jpeg) => {
                    let name = format!("Im{}", photos.len());
                    photos.push((field.clone(), Slot::Image { name }, Some(jpeg)));
                }
                Err(e) => {
                    warn!(draft_id = %draft.draft_id, field, path = rel, error = %e, "photo unavailable for report");
                    warnings.push(format!("{field}: {e}"));
                    photos.push((field.clone(), Slot::Placeholder, None));
                }
            }
        }

        let bytes = assemble_pdf(draft, generated_at, &photos)?;
        let booking_id = draft
            .fields
            .get("booking_id")
            .map(|v| v.joined())
            .unwrap_or_else(|| "unknown".to_string());

        Ok(RenderedReport {
            file_name: report_file_name(&booking_id, generated_at),
            bytes,
            warnings,
        })
    }

    fn load_letterboxed_jpeg(&self, rel: &str) -> Result<Vec<u8>, RenderError> {
        let abs = self
            .layout
            .resolve(rel)
            .map_err(|e| RenderError::Io(e.to_string()))?;
        let raw = std::fs::read(&abs).map_err(|e| RenderError::Io(e.to_string()))?;
        let decoded =
            image::load_from_memory(&raw).map_err(|e| RenderError::Io(e.to_string()))?;

        let fitted = decoded.resize(IMAGE_FRAME_W, IMAGE_FRAME_H, FilterType::Triangle);
        let mut canvas =
            RgbImage::from_pixel(IMAGE_FRAME_W, IMAGE_FRAME_H, image::Rgb([255, 255, 255]));
        let dx = i64::from((IMAGE_FRAME_W - fitted.width()) / 2);
        let dy = i64::from((IMAGE_FRAME_H - fitted.height()) / 2);
        image::imageops::overlay(&mut canvas, &fitted.to_rgb8(), dx, dy);

        let mut out = Cursor::new(Vec::new());
        JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY)
            .encode_image(&canvas)
            .map_err(|e| RenderError::Encode(e.to_string()))?;
        Ok(out.into_inner())
    }
}

struct PageBuilder {
    pages: Vec<Vec<Operation>>,
    current: Vec<Operation>,
    y: f32,
}

impl PageBuilder {
    fn new() -> Self {
        Self {
            pages: Vec::new(),
            current: Vec::new(),
            y: PAGE_H - MARGIN,
        }
    }

    fn ensure_space(&mut self, needed: f32) {
        if self.y - needed < MARGIN {
            self.pages.push(std::mem::take(&mut self.current));
            self.y = PAGE_H - MARGIN;
        }
    }

    fn text_line(&mut self, size: f32, text: &str) {
        self.ensure_space(size + 4.0);
        self.y -= size + 4.0;
        self.current.extend([
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), size.into()]),
            Operation::new("Td", vec![MARGIN.into(), self.y.into()]),
            Operation::new("Tj", vec![Object::string_literal(escape_pdf_text(text))]),
            Operation::new("ET", vec![]),
        ]);
    }

    fn blank_line(&mut self) {
        self.y -= LINE_H / 2.0;
    }

    fn image_block(&mut self, label: &str, slot: &Slot) {
        let frame_h = IMAGE_FRAME_H as f32;
        self.ensure_space(frame_h + 2.0 * LINE_H + 10.0);
        self.text_line(BODY_SIZE, label);
        match slot {
            Slot::Image { name } => {
                self.y -= frame_h + 6.0;
                self.current.extend([
                    Operation::new("q", vec![]),
                    Operation::new(
                        "cm",
                        vec![
                            (IMAGE_FRAME_W as f32).into(),
                            0.into(),
                            0.into(),
                            frame_h.into(),
                            MARGIN.into(),
                            self.y.into(),
                        ],
                    ),
                    Operation::new("Do", vec![Object::Name(name.as_bytes().to_vec())]),
                    Operation::new("Q", vec![]),
                ]);
            }
            Slot::Placeholder => {
                self.text_line(BODY_SIZE, MISSING_PLACEHOLDER);
            }
        }
        self.y -= 4.0;
    }

    fn finish(mut self) -> Vec<Vec<Operation>> {
        self.pages.push(self.current);
        self.pages
    }
}

fn assemble_pdf(
    draft: &Draft,
    generated_at: i64,
    photos: &[(String, Slot, Option<Vec<u8>>)],
) -> Result<Vec<u8>, RenderError> {
    let mut builder = PageBuilder::new();
    builder.text_line(TITLE_SIZE, "Vehicle Pre-Delivery Inspection Report");
    builder.text_line(
        BODY_SIZE,
        &format!("Generated: {}", format_timestamp(generated_at)),
    );
    builder.text_line(BODY_SIZE, &format!("Draft: {}", draft.draft_id));
    builder.blank_line();

    for key in REQUIRED_FIELDS {
        let value = draft
            .fields
            .get(key)
            .map(|v| v.joined())
            .filter(|v| !v.trim().is_empty());
        builder.text_line(
            BODY_SIZE,
            &format!("{key}: {}", value.as_deref().unwrap_or(MISSING_PLACEHOLDER)),
        );
    }
    for (key, value) in &draft.fields {
        if value.is_empty() || REQUIRED_FIELDS.contains(&key.as_str()) {
            continue;
        }
        builder.text_line(BODY_SIZE, &format!("{key}: {}", value.joined()));
    }

    if !photos.is_empty() {
        builder.blank_line();
        builder.text_line(TITLE_SIZE - 4.0, "Photos");
        for (field, slot, _) in photos {
            builder.image_block(field, slot);
        }
    }

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut xobjects = lopdf::Dictionary::new();
    for (_, slot, jpeg) in photos {
        if let (Slot::Image { name }, Some(jpeg)) = (slot, jpeg) {
            let image_id = doc.add_object(Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => IMAGE_FRAME_W as i64,
                    "Height" => IMAGE_FRAME_H as i64,
                    "ColorSpace" => "DeviceRGB",
                    "BitsPerComponent" => 8,
                    "Filter" => "DCTDecode",
                },
                jpeg.clone(),
            ));
            xobjects.set(name.as_bytes().to_vec(), Object::Reference(image_id));
        }
    }

    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => Object::Reference(font_id) },
        "XObject" => Object::Dictionary(xobjects),
    });

    let mut page_ids: Vec<Object> = Vec::new();
    for ops in builder.finish() {
        let content = Content { operations: ops };
        let encoded = content
            .encode()
            .map_err(|e| RenderError::Encode(e.to_string()))?;
        // Uncompressed on purpose, keeps the stream greppable.
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
            "Contents" => Object::Reference(content_id),
        });
        page_ids.push(Object::Reference(page_id));
    }

    let page_count = page_ids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => page_ids,
            "Count" => page_count,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_W.into(), PAGE_H.into()],
            "Resources" => Object::Reference(resources_id),
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_id),
    });
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::string_literal("Vehicle Pre-Delivery Inspection Report"),
        "CreationDate" => Object::string_literal(format!("D:{}Z", compact_timestamp(generated_at))),
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);

    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|e| RenderError::Encode(e.to_string()))?;
    Ok(out)
}

fn format_timestamp(unix: i64) -> String {
    Utc.timestamp_opt(unix, 0)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| unix.to_string())
}

fn compact_timestamp(unix: i64) -> String {
    Utc.timestamp_opt(unix, 0)
        .single()
        .map(|t| t.format("%Y%m%d%H%M%S").to_string())
        .unwrap_or_else(|| unix.to_string())
}

fn escape_pdf_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '(' | ')' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            '\n' | '\r' => out.push(' '),
            c if c.is_ascii() => out.push(c),
            // Helvetica with the default encoding cannot carry arbitrary
            // unicode; degrade rather than emit broken strings.
            _ => out.push('?'),
        }
    }
    out
}
