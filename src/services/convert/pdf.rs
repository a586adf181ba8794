//! Plain-text PDF rendering: one text block per paragraph on A4 pages.

use lopdf::{
    Dictionary, Document, Object, Stream,
    content::{Content, Operation},
    dictionary,
};

use super::{
    ConvertError,
    font::{FontWriter, PdfFont},
};

const FONT_RESOURCE: &str = "F1";
const TAB: &str = "    ";

/// Page geometry in points.
#[derive(Clone, Copy, Debug)]
pub struct PageLayout {
    pub width: f32,
    pub height: f32,
    pub margin: f32,
    pub font_size: f32,
    pub line_height: f32,
}

impl Default for PageLayout {
    /// A4 with 10 mm margins, 12 pt text and 10 mm lines.
    fn default() -> Self {
        Self {
            width: 595.28,
            height: 841.89,
            margin: 28.35,
            font_size: 12.0,
            line_height: 28.35,
        }
    }
}

impl PageLayout {
    fn text_width(&self) -> f32 {
        self.width - 2.0 * self.margin
    }

    fn top(&self) -> f32 {
        self.height - self.margin
    }

    /// Baseline of a line whose cell starts at `y`, text centred in the cell.
    fn baseline(&self, y: f32) -> f32 {
        y - (self.line_height + self.font_size * 0.7) / 2.0
    }
}

/// Render `paragraphs` to PDF bytes.
pub fn render(paragraphs: &[String], font: &PdfFont, layout: &PageLayout) -> Result<Vec<u8>, ConvertError> {
    let mut writer = font.writer()?;
    let pages = layout_pages(paragraphs, &mut writer, layout);

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = writer.finish(&mut doc);
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { FONT_RESOURCE => font_id },
    });

    let mut kids = Vec::with_capacity(pages.len());
    for operations in pages {
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.encode()?));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), layout.width.into(), layout.height.into()],
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)?;
    Ok(bytes)
}

/// Lay paragraphs out into per-page content operations. There is always at
/// least one page.
fn layout_pages(paragraphs: &[String], writer: &mut FontWriter<'_>, layout: &PageLayout) -> Vec<Vec<Operation>> {
    let mut pages = vec![Vec::new()];
    let mut y = layout.top();

    for paragraph in paragraphs {
        let text = paragraph.replace('\t', TAB);
        if text.trim().is_empty() {
            y -= layout.line_height;
            continue;
        }

        let lines = wrap(&text, layout, writer);
        let mut block_open = false;
        let mut last_baseline = 0.0;

        for line in lines {
            if y - layout.line_height < layout.margin {
                if block_open {
                    current_page(&mut pages).push(Operation::new("ET", vec![]));
                    block_open = false;
                }
                pages.push(Vec::new());
                y = layout.top();
            }

            let baseline = layout.baseline(y);
            let ops = current_page(&mut pages);
            if block_open {
                ops.push(Operation::new("Td", vec![0.into(), (baseline - last_baseline).into()]));
            } else {
                ops.push(Operation::new("BT", vec![]));
                ops.push(Operation::new(
                    "Tf",
                    vec![FONT_RESOURCE.into(), layout.font_size.into()],
                ));
                ops.push(Operation::new("Td", vec![layout.margin.into(), baseline.into()]));
                block_open = true;
            }
            if !line.is_empty() {
                let operand = writer.encode(&line);
                current_page(&mut pages).push(Operation::new("Tj", vec![operand]));
            }

            last_baseline = baseline;
            y -= layout.line_height;
        }

        if block_open {
            current_page(&mut pages).push(Operation::new("ET", vec![]));
        }
    }

    pages
}

fn current_page(pages: &mut Vec<Vec<Operation>>) -> &mut Vec<Operation> {
    if pages.is_empty() {
        pages.push(Vec::new());
    }
    let last = pages.len() - 1;
    &mut pages[last]
}

/// Greedy word wrap to the text width. Hard breaks are kept, and a word
/// wider than a whole line is split by character.
fn wrap(text: &str, layout: &PageLayout, writer: &mut FontWriter<'_>) -> Vec<String> {
    let scale = layout.font_size / 1000.0;
    let max_width = layout.text_width();
    let mut measure = |s: &str| s.chars().map(|c| writer.char_width(c) * scale).sum::<f32>();
    let space = measure(" ");

    let mut lines = Vec::new();
    for hard_line in text.split('\n') {
        let mut line = String::new();
        let mut width = 0.0;

        for word in hard_line.split(' ') {
            let word_width = measure(word);
            if !line.is_empty() && width + space + word_width <= max_width {
                line.push(' ');
                line.push_str(word);
                width += space + word_width;
                continue;
            }
            if !line.is_empty() {
                lines.push(std::mem::take(&mut line));
            }
            if word_width <= max_width {
                line.push_str(word);
                width = word_width;
                continue;
            }

            width = 0.0;
            for c in word.chars() {
                let char_width = measure(c.encode_utf8(&mut [0u8; 4]));
                if !line.is_empty() && width + char_width > max_width {
                    lines.push(std::mem::take(&mut line));
                    width = 0.0;
                }
                line.push(c);
                width += char_width;
            }
        }
        lines.push(line);
    }

    lines
}
