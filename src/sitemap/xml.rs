//! Sitemap XML parsing
//!
//! Handles both `<urlset>` and `<sitemapindex>` documents, with or without
//! the sitemaps.org namespace prefix, and gzip-compressed bodies.

use flate2::read::GzDecoder;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::Read;
use thiserror::Error;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Error)]
pub enum SitemapError {
    #[error("Malformed sitemap XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Failed to decompress sitemap: {0}")]
    Gzip(#[from] std::io::Error),

    #[error("Document is neither a urlset nor a sitemap index")]
    NotASitemap,
}

/// What a sitemap document lists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SitemapKind {
    /// Page URLs
    UrlSet,
    /// Further sitemaps
    Index,
}

/// A parsed sitemap document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitemapDocument {
    pub kind: SitemapKind,
    /// `<loc>` values in document order, as written
    pub locs: Vec<String>,
}

/// Parses a sitemap body, inflating it first if it is gzip-compressed
pub fn parse_sitemap(body: &[u8]) -> Result<SitemapDocument, SitemapError> {
    if body.starts_with(&GZIP_MAGIC) {
        let mut inflated = Vec::new();
        GzDecoder::new(body).read_to_end(&mut inflated)?;
        return parse_xml(&inflated);
    }
    parse_xml(body)
}

fn parse_xml(xml: &[u8]) -> Result<SitemapDocument, SitemapError> {
    let mut reader = Reader::from_reader(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut kind = None;
    let mut in_loc = false;
    let mut current = String::new();
    let mut locs = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"urlset" if kind.is_none() => kind = Some(SitemapKind::UrlSet),
                b"sitemapindex" if kind.is_none() => kind = Some(SitemapKind::Index),
                b"loc" => {
                    in_loc = true;
                    current.clear();
                }
                _ => {}
            },
            Event::End(e) => {
                if e.local_name().as_ref() == b"loc" {
                    in_loc = false;
                    let loc = current.trim();
                    if !loc.is_empty() {
                        locs.push(loc.to_string());
                    }
                }
            }
            Event::Text(t) if in_loc => current.push_str(&t.unescape()?),
            Event::CData(t) if in_loc => {
                current.push_str(&String::from_utf8_lossy(&t.into_inner()));
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let kind = kind.ok_or(SitemapError::NotASitemap)?;
    Ok(SitemapDocument { kind, locs })
}
