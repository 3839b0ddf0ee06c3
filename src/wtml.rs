//! WTML manifests.
//!
//! A pyramid is described to WorldWide Telescope by a small XML document: a
//! folder holding one place whose foreground image set points at the tile
//! URL template. Two copies are written per pyramid:
//!
//! - `index_rel.wtml`: URLs relative to the pyramid directory
//! - `index.wtml`: the same document with every URL resolved against the base
//!   URL the directory is published under
//!
//! ## URL rewriting
//!
//! [`rewrite_urls`] works on the document text and only touches URL-bearing
//! values: the `Url`, `DemUrl`, `Thumbnail` and `ThumbnailUrl` attributes and
//! the text of `<ThumbnailUrl>` elements. Everything else, including
//! formatting, passes through byte for byte. Values that are empty, rooted at
//! `/` or carry a scheme are already absolute and left alone. Attribute
//! values are expected to escape `>`, which every WTML writer does.

use std::fs;
use std::io;
use std::path::Path;

/// File name of the manifest with relative URLs.
pub const RELATIVE_MANIFEST: &str = "index_rel.wtml";
/// File name of the manifest with absolute URLs.
pub const ABSOLUTE_MANIFEST: &str = "index.wtml";
/// File name of the thumbnail referenced by manifests.
pub const THUMBNAIL_FILE: &str = "thumb.jpg";

const URL_ATTRIBUTES: &[&str] = &["Url", "DemUrl", "Thumbnail", "ThumbnailUrl"];
const URL_ELEMENTS: &[&str] = &["ThumbnailUrl"];

/// Description of one TOAST sky pyramid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSetManifest {
    /// Dataset name shown in the viewer.
    pub name: String,
    /// Deepest tile level.
    pub tile_levels: u32,
    /// Tile URL template, e.g. `{1}/{3}/{3}_{2}.png`.
    pub url: String,
    /// Tile file extension with dot, e.g. `.png`.
    pub file_type: String,
    pub thumbnail_url: Option<String>,
}

impl ImageSetManifest {
    /// Render the manifest as a WTML document.
    pub fn to_wtml(&self) -> String {
        let name = escape_xml(&self.name);
        let thumbnail = self
            .thumbnail_url
            .as_deref()
            .map(|t| format!("<ThumbnailUrl>{}</ThumbnailUrl>", escape_xml(t)));
        let thumb_line = |indent: &str| {
            thumbnail
                .as_ref()
                .map(|t| format!("{indent}{t}\n"))
                .unwrap_or_default()
        };

        format!(
            r#"<?xml version='1.0' encoding='UTF-8'?>
<Folder Browseable="True" Group="Explorer" Name="{name}" Searchable="True">
  <Place Angle="0" AngularSize="0" DataSetType="Sky" Dec="0" Distance="0" DomeAlt="0" DomeAz="0" Lat="0" Lng="0" Magnitude="0" Name="{name}" Opacity="100" RA="0" Rotation="0" ZoomLevel="360">
    <ForegroundImageSet>
      <ImageSet BandPass="Visible" BaseDegreesPerTile="180" BaseTileLevel="0" BottomsUp="False" CenterX="0" CenterY="0" DataSetType="Sky" ElevationModel="False" FileType="{file_type}" Generic="False" MeanRadius="0" Name="{name}" OffsetX="0" OffsetY="0" Projection="Toast" Rotation="0" Sparse="True" StockSet="False" TileLevels="{levels}" Url="{url}" WidthFactor="2">
{image_thumb}      </ImageSet>
    </ForegroundImageSet>
{place_thumb}  </Place>
</Folder>
"#,
            file_type = escape_xml(&self.file_type),
            levels = self.tile_levels,
            url = escape_xml(&self.url),
            image_thumb = thumb_line("        "),
            place_thumb = thumb_line("    "),
        )
    }

    /// Write the manifest to `path`.
    pub fn write(&self, path: &Path) -> io::Result<()> {
        fs::write(path, self.to_wtml())
    }
}

/// Escape the five XML special characters.
pub fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

/// Undo [`escape_xml`]. Unknown entities are kept verbatim.
pub fn unescape_xml(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn is_absolute_url(url: &str) -> bool {
    url.starts_with('/') || url.contains("://") || url.starts_with("data:")
}

/// Resolve `url` against `base`.
///
/// - `resolve_url("/Foo_toast/", "thumb.jpg")` → `/Foo_toast/thumb.jpg`
/// - `resolve_url("/Foo_toast/", "./0/0/0_0.png")` → `/Foo_toast/0/0/0_0.png`
/// - absolute and empty URLs are returned unchanged
pub fn resolve_url(base: &str, url: &str) -> String {
    if url.is_empty() || is_absolute_url(url) {
        return url.to_string();
    }
    let mut rel = url;
    while let Some(stripped) = rel.strip_prefix("./") {
        rel = stripped;
    }
    format!("{}/{}", base.trim_end_matches('/'), rel)
}

/// Name of the element a tag opens, or `None` for closing tags,
/// declarations and processing instructions.
fn opened_element(tag: &str) -> Option<&str> {
    let inner = tag.strip_prefix('<')?;
    if inner.starts_with(['/', '?', '!']) {
        return None;
    }
    let end = inner
        .find(|c: char| c.is_whitespace() || c == '/' || c == '>')
        .unwrap_or(inner.len());
    Some(&inner[..end])
}

/// Walk the attributes of one start tag, letting `visit` replace the
/// (unescaped) values of URL attributes.
fn visit_tag(tag: &str, visit: &mut dyn FnMut(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(tag.len());
    let mut pos = 0;
    while let Some(offset) = tag[pos..].find('=') {
        let eq = pos + offset;
        let after_eq = &tag[eq + 1..];
        let quote_at = eq + 1 + (after_eq.len() - after_eq.trim_start().len());
        let quote = match tag[quote_at..].chars().next() {
            Some(q @ ('"' | '\'')) => q,
            _ => {
                out.push_str(&tag[pos..=eq]);
                pos = eq + 1;
                continue;
            }
        };
        let value_start = quote_at + 1;
        let Some(value_len) = tag[value_start..].find(quote) else {
            break;
        };
        let value_end = value_start + value_len;
        let name = tag[pos..eq]
            .trim_end()
            .rsplit(|c: char| c.is_whitespace())
            .next()
            .unwrap_or("");

        out.push_str(&tag[pos..value_start]);
        let raw = &tag[value_start..value_end];
        let replaced = if URL_ATTRIBUTES.contains(&name) {
            visit(&unescape_xml(raw)).map(|v| escape_xml(&v))
        } else {
            None
        };
        out.push_str(replaced.as_deref().unwrap_or(raw));
        pos = value_end;
    }
    out.push_str(&tag[pos..]);
    out
}

/// Walk every URL-bearing value of a WTML document. `visit` receives each
/// value unescaped and may return a replacement.
fn visit_urls(xml: &str, visit: &mut dyn FnMut(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(xml.len() + 256);
    let mut rest = xml;
    let mut in_url_element = false;

    while let Some(start) = rest.find('<') {
        let text = &rest[..start];
        if in_url_element && !text.trim().is_empty() {
            let leading = &text[..text.len() - text.trim_start().len()];
            let trailing = &text[text.trim_end().len()..];
            match visit(&unescape_xml(text.trim())) {
                Some(v) => {
                    out.push_str(leading);
                    out.push_str(&escape_xml(&v));
                    out.push_str(trailing);
                }
                None => out.push_str(text),
            }
        } else {
            out.push_str(text);
        }

        let after = &rest[start..];
        let terminator = if after.starts_with("<!--") { "-->" } else { ">" };
        let Some(end) = after.find(terminator) else {
            out.push_str(after);
            return out;
        };
        let tag = &after[..end + terminator.len()];

        match opened_element(tag) {
            Some(name) => {
                let self_closing = tag.ends_with("/>");
                in_url_element = URL_ELEMENTS.contains(&name) && !self_closing;
                out.push_str(&visit_tag(tag, visit));
            }
            None => {
                in_url_element = false;
                out.push_str(tag);
            }
        }
        rest = &after[tag.len()..];
    }
    out.push_str(rest);
    out
}

/// Rewrite every relative URL in a WTML document to be rooted at `base_url`.
pub fn rewrite_urls(xml: &str, base_url: &str) -> String {
    visit_urls(xml, &mut |url| Some(resolve_url(base_url, url)))
}

/// Every URL-bearing value in a WTML document, in document order.
pub fn manifest_urls(xml: &str) -> Vec<String> {
    let mut urls = Vec::new();
    visit_urls(xml, &mut |url| {
        urls.push(url.to_string());
        None
    });
    urls
}

/// URLs in a document that are neither empty nor absolute.
pub fn relative_urls(xml: &str) -> Vec<String> {
    manifest_urls(xml)
        .into_iter()
        .filter(|u| !u.is_empty() && !is_absolute_url(u))
        .collect()
}

/// Read `input`, rewrite its URLs against `base_url`, write `output`.
pub fn rewrite_file(input: &Path, base_url: &str, output: &Path) -> io::Result<()> {
    let xml = fs::read_to_string(input)?;
    fs::write(output, rewrite_urls(&xml, base_url))
}
