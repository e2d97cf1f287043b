//! Sitemap fetch and parse: `<urlset>` leaf sitemaps and recursive
//! `<sitemapindex>` handling, with transparent gzip decompression.
//!
//! XML parsing via `quick-xml`, the XML crate already used elsewhere in the
//! pack (harborgrid's Caddy-config tooling) for streaming tag-by-tag reads
//! rather than building a DOM, which keeps this in line with how that repo
//! handles structured config documents.

use super::RobotsError;
use flate2::read::GzDecoder;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::Read;

#[derive(Debug, Clone)]
pub struct SitemapUrl {
    pub loc: String,
    pub lastmod: Option<String>,
    pub priority: Option<f32>,
}

const MAX_INDEX_DEPTH: u32 = 3;
const MAX_URLS_PER_SITEMAP: usize = 50_000;

pub async fn fetch_and_parse(
    client: &reqwest::Client,
    url: &str,
) -> Result<Vec<SitemapUrl>, RobotsError> {
    fetch_recursive(client, url, 0).await
}

async fn fetch_recursive(
    client: &reqwest::Client,
    url: &str,
    depth: u32,
) -> Result<Vec<SitemapUrl>, RobotsError> {
    if depth > MAX_INDEX_DEPTH {
        return Ok(Vec::new());
    }
    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| RobotsError::Fetch(e.to_string()))?;
    let bytes = resp
        .bytes()
        .await
        .map_err(|e| RobotsError::Fetch(e.to_string()))?;

    let text = decompress_if_gzip(&bytes, url)?;
    let parsed = parse_document(&text)?;

    match parsed {
        ParsedDocument::UrlSet(urls) => Ok(urls),
        ParsedDocument::Index(nested) => {
            let mut out = Vec::new();
            for nested_url in nested {
                // Best-effort: one bad nested sitemap doesn't kill the rest.
                if let Ok(mut urls) = Box::pin(fetch_recursive(client, &nested_url, depth + 1)).await {
                    out.append(&mut urls);
                    if out.len() >= MAX_URLS_PER_SITEMAP {
                        break;
                    }
                }
            }
            Ok(out)
        }
    }
}

fn decompress_if_gzip(bytes: &[u8], url: &str) -> Result<String, RobotsError> {
    let looks_gzipped = bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b;
    if looks_gzipped || url.ends_with(".gz") {
        let mut decoder = GzDecoder::new(bytes);
        let mut out = String::new();
        decoder
            .read_to_string(&mut out)
            .map_err(|e| RobotsError::Parse(format!("gzip decode failed: {e}")))?;
        Ok(out)
    } else {
        String::from_utf8(bytes.to_vec()).map_err(|e| RobotsError::Parse(e.to_string()))
    }
}

enum ParsedDocument {
    UrlSet(Vec<SitemapUrl>),
    Index(Vec<String>),
}

fn parse_document(xml: &str) -> Result<ParsedDocument, RobotsError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut urls = Vec::new();
    let mut index_locs = Vec::new();
    let mut is_index = false;

    let mut current_tag = String::new();
    let mut current_loc: Option<String> = None;
    let mut current_lastmod: Option<String> = None;
    let mut current_priority: Option<f32> = None;
    let mut in_entry = false;

    let mut buf = Vec::new();
    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(|e| RobotsError::Parse(e.to_string()))?
        {
            Event::Eof => break,
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match name.as_str() {
                    "sitemapindex" => is_index = true,
                    "url" | "sitemap" => {
                        in_entry = true;
                        current_loc = None;
                        current_lastmod = None;
                        current_priority = None;
                    }
                    _ => {}
                }
                current_tag = name;
            }
            Event::Text(t) => {
                if !in_entry {
                    continue;
                }
                let text = t.unescape().unwrap_or_default().to_string();
                match current_tag.as_str() {
                    "loc" => current_loc = Some(text),
                    "lastmod" => current_lastmod = Some(text),
                    "priority" => current_priority = text.parse().ok(),
                    _ => {}
                }
            }
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if (name == "url" || name == "sitemap") && in_entry {
                    in_entry = false;
                    if let Some(loc) = current_loc.take() {
                        if is_index {
                            index_locs.push(loc);
                        } else {
                            urls.push(SitemapUrl {
                                loc,
                                lastmod: current_lastmod.take(),
                                priority: current_priority.take(),
                            });
                        }
                        if urls.len() >= MAX_URLS_PER_SITEMAP {
                            break;
                        }
                    }
                }
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(if is_index {
        ParsedDocument::Index(index_locs)
    } else {
        ParsedDocument::UrlSet(urls)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_urlset() {
        let xml = r#"<?xml version="1.0"?>
        <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
            <url><loc>https://example.com/a</loc><lastmod>2024-01-01</lastmod><priority>0.8</priority></url>
            <url><loc>https://example.com/b</loc></url>
        </urlset>"#;
        let ParsedDocument::UrlSet(urls) = parse_document(xml).unwrap() else {
            panic!("expected urlset");
        };
        assert_eq!(urls.len(), 2);
        assert_eq!(urls[0].loc, "https://example.com/a");
        assert_eq!(urls[0].priority, Some(0.8));
        assert_eq!(urls[1].lastmod, None);
    }

    #[test]
    fn parses_sitemapindex() {
        let xml = r#"<sitemapindex>
            <sitemap><loc>https://example.com/sitemap-1.xml</loc></sitemap>
            <sitemap><loc>https://example.com/sitemap-2.xml</loc></sitemap>
        </sitemapindex>"#;
        let ParsedDocument::Index(locs) = parse_document(xml).unwrap() else {
            panic!("expected index");
        };
        assert_eq!(locs.len(), 2);
    }
}
