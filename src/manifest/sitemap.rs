//! XML sitemap parsing (`<urlset>` and `<sitemapindex>`)

use crate::manifest::ManifestEntry;
use quick_xml::events::Event;
use quick_xml::Reader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Parent {
    Url,
    Sitemap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Loc,
    LastMod,
}

/// Extracts entries from a sitemap document in document order
///
/// `<sitemap><loc>` children of a `<sitemapindex>` become index entries and
/// `<url><loc>` children of a `<urlset>` become leaves, carrying `<lastmod>`
/// when present. Only direct children of `<url>`/`<sitemap>` are read, so
/// extension elements such as `<image:loc>` are ignored.
pub fn parse(body: &str) -> Result<Vec<ManifestEntry>, String> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut depth: usize = 0;
    let mut parent: Option<(Parent, usize)> = None;
    let mut field: Option<Field> = None;
    let mut loc: Option<String> = None;
    let mut last_modified: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                depth += 1;
                match (e.local_name().as_ref(), parent) {
                    (b"url", None) => {
                        parent = Some((Parent::Url, depth));
                        loc = None;
                        last_modified = None;
                    }
                    (b"sitemap", None) => {
                        parent = Some((Parent::Sitemap, depth));
                        loc = None;
                        last_modified = None;
                    }
                    (b"loc", Some((_, d))) if depth == d + 1 => field = Some(Field::Loc),
                    (b"lastmod", Some((_, d))) if depth == d + 1 => field = Some(Field::LastMod),
                    _ => {}
                }
            }
            Ok(Event::Text(t)) => {
                if let Some(f) = field {
                    let text = t.unescape().map_err(|e| e.to_string())?;
                    store(f, text.trim(), &mut loc, &mut last_modified);
                }
            }
            Ok(Event::CData(c)) => {
                if let Some(f) = field {
                    let raw = c.into_inner();
                    let text = String::from_utf8_lossy(&raw);
                    store(f, text.trim(), &mut loc, &mut last_modified);
                }
            }
            Ok(Event::End(e)) => {
                match (e.local_name().as_ref(), parent) {
                    (b"url", Some((Parent::Url, d))) if d == depth => {
                        if let Some(url) = loc.take() {
                            entries.push(ManifestEntry::Leaf {
                                url,
                                last_modified: last_modified.take(),
                            });
                        }
                        parent = None;
                    }
                    (b"sitemap", Some((Parent::Sitemap, d))) if d == depth => {
                        if let Some(url) = loc.take() {
                            entries.push(ManifestEntry::Index { url });
                        }
                        parent = None;
                    }
                    _ => {}
                }
                field = None;
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(format!(
                    "XML error at position {}: {}",
                    reader.buffer_position(),
                    e
                ))
            }
            _ => {}
        }
    }

    Ok(entries)
}

fn store(field: Field, text: &str, loc: &mut Option<String>, last_modified: &mut Option<String>) {
    if text.is_empty() {
        return;
    }
    match field {
        Field::Loc => {
            loc.get_or_insert_with(String::new).push_str(text);
        }
        Field::LastMod => *last_modified = Some(text.to_string()),
    }
}
