//! Fonts for PDF output.
//!
//! A TrueType font is embedded as a Type0 font with Identity-H encoding, so
//! any character the font covers can be written; a ToUnicode map keeps the
//! text extractable. The builtin option uses standard Helvetica, which needs
//! no font file but only covers Latin-1.

use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat, dictionary};
use std::{
    collections::BTreeMap,
    fmt::Write as _,
    path::{Path, PathBuf},
};
use ttf_parser::{Face, GlyphId};

use super::ConvertError;

/// Unicode-capable font shipped in the converter image.
pub const DEFAULT_FONT_PATH: &str = "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf";

const BUILTIN_FONT: &str = "Helvetica";
const CMAP_CHUNK: usize = 100;

/// Where the output font comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FontSource {
    Builtin,
    TrueType(PathBuf),
}

impl Default for FontSource {
    fn default() -> Self {
        FontSource::TrueType(PathBuf::from(DEFAULT_FONT_PATH))
    }
}

impl FontSource {
    /// `builtin` selects Helvetica; anything else is a font file path.
    pub fn from_setting(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("builtin") {
            FontSource::Builtin
        } else {
            FontSource::TrueType(PathBuf::from(value.trim()))
        }
    }

    pub fn load(&self) -> Result<PdfFont, ConvertError> {
        match self {
            FontSource::Builtin => Ok(PdfFont::Builtin),
            FontSource::TrueType(path) => TrueTypeFont::load(path).map(PdfFont::TrueType),
        }
    }
}

/// A font ready to be written into a document.
pub enum PdfFont {
    Builtin,
    TrueType(TrueTypeFont),
}

impl PdfFont {
    pub fn writer(&self) -> Result<FontWriter<'_>, ConvertError> {
        match self {
            PdfFont::Builtin => Ok(FontWriter::Builtin),
            PdfFont::TrueType(font) => {
                let face = Face::parse(&font.data, 0)
                    .map_err(|err| ConvertError::Font(format!("{}: {}", font.name, err)))?;
                Ok(FontWriter::Embedded {
                    font,
                    scale: 1000.0 / f32::from(face.units_per_em()),
                    face,
                    used: BTreeMap::new(),
                })
            }
        }
    }
}

pub struct TrueTypeFont {
    pub name: String,
    data: Vec<u8>,
}

impl TrueTypeFont {
    pub fn load(path: &Path) -> Result<Self, ConvertError> {
        let data = std::fs::read(path)
            .map_err(|err| ConvertError::Font(format!("reading {}: {}", path.display(), err)))?;
        Face::parse(&data, 0)
            .map_err(|err| ConvertError::Font(format!("parsing {}: {}", path.display(), err)))?;

        let name: String = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("EmbeddedFont")
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
            .collect();

        Ok(Self { name, data })
    }
}

/// Measures and encodes text for one document, tracking which glyphs were
/// used so the font dictionaries can describe them.
pub enum FontWriter<'a> {
    Builtin,
    Embedded {
        font: &'a TrueTypeFont,
        face: Face<'a>,
        scale: f32,
        used: BTreeMap<u16, (char, i64)>,
    },
}

impl FontWriter<'_> {
    /// Advance width of `c` in thousandths of an em.
    pub fn char_width(&mut self, c: char) -> f32 {
        match self {
            FontWriter::Builtin => builtin_width(c),
            FontWriter::Embedded {
                face, scale, used, ..
            } => {
                let gid = face.glyph_index(c).unwrap_or(GlyphId(0));
                let width = f32::from(face.glyph_hor_advance(gid).unwrap_or(0)) * *scale;
                used.entry(gid.0).or_insert((c, width.round() as i64));
                width
            }
        }
    }

    /// Encode `text` as a string operand for `Tj`.
    pub fn encode(&mut self, text: &str) -> Object {
        match self {
            FontWriter::Builtin => {
                let bytes = text
                    .chars()
                    .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                    .collect();
                Object::String(bytes, StringFormat::Literal)
            }
            FontWriter::Embedded { .. } => {
                let mut bytes = Vec::with_capacity(text.len() * 2);
                for c in text.chars() {
                    self.char_width(c);
                    if let FontWriter::Embedded { face, .. } = self {
                        let gid = face.glyph_index(c).unwrap_or(GlyphId(0));
                        bytes.extend_from_slice(&gid.0.to_be_bytes());
                    }
                }
                Object::String(bytes, StringFormat::Hexadecimal)
            }
        }
    }

    /// Add the font objects to `doc` and return the font dictionary's id.
    pub fn finish(self, doc: &mut Document) -> ObjectId {
        match self {
            FontWriter::Builtin => doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => BUILTIN_FONT,
                "Encoding" => "WinAnsiEncoding",
            }),
            FontWriter::Embedded {
                font,
                face,
                scale,
                used,
            } => embed_truetype(doc, font, &face, scale, &used),
        }
    }
}

fn embed_truetype(
    doc: &mut Document,
    font: &TrueTypeFont,
    face: &Face<'_>,
    scale: f32,
    used: &BTreeMap<u16, (char, i64)>,
) -> ObjectId {
    let metric = |v: i16| (f32::from(v) * scale).round() as i64;
    let bbox = face.global_bounding_box();

    let font_file_id = doc.add_object(Stream::new(
        dictionary! { "Length1" => font.data.len() as i64 },
        font.data.clone(),
    ));

    let descriptor_id = doc.add_object(dictionary! {
        "Type" => "FontDescriptor",
        "FontName" => font.name.as_str(),
        "Flags" => 32,
        "FontBBox" => vec![
            metric(bbox.x_min).into(),
            metric(bbox.y_min).into(),
            metric(bbox.x_max).into(),
            metric(bbox.y_max).into(),
        ],
        "ItalicAngle" => 0,
        "Ascent" => metric(face.ascender()),
        "Descent" => metric(face.descender()),
        "CapHeight" => metric(face.capital_height().unwrap_or(face.ascender())),
        "StemV" => 80,
        "FontFile2" => font_file_id,
    });

    let mut widths = Vec::with_capacity(used.len() * 2);
    for (gid, (_, width)) in used {
        widths.push(Object::Integer(i64::from(*gid)));
        widths.push(Object::Array(vec![Object::Integer(*width)]));
    }

    let cid_font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "CIDFontType2",
        "BaseFont" => font.name.as_str(),
        "CIDSystemInfo" => dictionary! {
            "Registry" => Object::string_literal("Adobe"),
            "Ordering" => Object::string_literal("Identity"),
            "Supplement" => 0,
        },
        "FontDescriptor" => descriptor_id,
        "W" => widths,
        "CIDToGIDMap" => "Identity",
    });

    let to_unicode_id = doc.add_object(Stream::new(Dictionary::new(), to_unicode_cmap(used).into_bytes()));

    doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type0",
        "BaseFont" => font.name.as_str(),
        "Encoding" => "Identity-H",
        "DescendantFonts" => vec![cid_font_id.into()],
        "ToUnicode" => to_unicode_id,
    })
}

/// CMap from glyph ids back to the characters they were used for.
fn to_unicode_cmap(used: &BTreeMap<u16, (char, i64)>) -> String {
    let mut cmap = String::from(
        "/CIDInit /ProcSet findresource begin\n12 dict begin\nbegincmap\n\
         /CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n\
         /CMapName /Adobe-Identity-UCS def\n/CMapType 2 def\n\
         1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n",
    );

    let entries: Vec<_> = used.iter().filter(|(gid, _)| **gid != 0).collect();
    for chunk in entries.chunks(CMAP_CHUNK) {
        let _ = writeln!(cmap, "{} beginbfchar", chunk.len());
        for (gid, (c, _)) in chunk {
            let utf16: String = c
                .encode_utf16(&mut [0u16; 2])
                .iter()
                .map(|unit| format!("{:04X}", unit))
                .collect();
            let _ = writeln!(cmap, "<{:04X}> <{}>", gid, utf16);
        }
        cmap.push_str("endbfchar\n");
    }

    cmap.push_str("endcmap\nCMapName currentdict /CMap defineresource pop\nend\nend\n");
    cmap
}

/// Approximate Helvetica advance widths.
fn builtin_width(c: char) -> f32 {
    match c {
        ' ' | 'f' | 't' | 'I' | '!' | '.' | ',' | ':' | ';' | '/' => 278.0,
        'i' | 'j' | 'l' | '\'' | '|' => 222.0,
        'r' | '(' | ')' | '-' => 333.0,
        'm' | 'M' => 833.0,
        'W' => 944.0,
        'w' => 722.0,
        'A'..='Z' => 667.0,
        _ => 556.0,
    }
}
