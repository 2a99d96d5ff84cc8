/*============================================================
  Synavera Project: Sparkler
  Module: sparkler_core::appcast
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Fetch and parse the XML appcast into Version records with
    their nested deltas.

  Security / Safety Notes:
    Read-only, unauthenticated HTTP GET. The document is
    parsed strictly; a malformed item aborts the fetch.

  Dependencies:
    reqwest for HTTP, quick-xml for event-based parsing.

  Operational Scope:
    Supplies remote declarations for the verify-feed flow and
    the `feed` subcommand.

  Revision History:
    2026-10-16 COD  Implemented appcast reader.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Structured response parsing with explicit error paths
    - No partial results on malformed input
============================================================*/

use std::collections::HashMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use reqwest::Url;

use crate::catalog::build_http_client;
use crate::config::FeedConfig;
use crate::error::{Result, SparklerError};
use crate::model::{Delta, Version};

const ATTR_URL: &str = "url";
const ATTR_VERSION: &str = "version";
const ATTR_SHORT_VERSION: &str = "shortVersionString";
const ATTR_SIGNATURE: &str = "dsaSignature";
const ATTR_LENGTH: &str = "length";
const ATTR_DELTA_FROM: &str = "deltaFrom";

/// Client for reading an appcast feed.
#[derive(Clone)]
pub struct AppcastReader {
    client: reqwest::Client,
}

impl AppcastReader {
    pub fn new(config: &FeedConfig) -> Result<Self> {
        Ok(Self {
            client: build_http_client(config.timeout)?,
        })
    }

    /// Download and parse the appcast at `url`.
    pub async fn fetch_appcast(&self, url: &str) -> Result<Vec<Version>> {
        let unreachable = |reason: String| SparklerError::FeedUnreachable {
            url: url.to_string(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| unreachable(err.to_string()))?;
        if !response.status().is_success() {
            return Err(unreachable(format!("status {}", response.status())));
        }
        let body = response
            .text()
            .await
            .map_err(|err| unreachable(err.to_string()))?;

        parse_appcast(&body).map_err(|reason| SparklerError::FeedMalformed {
            url: url.to_string(),
            reason,
        })
    }
}

#[derive(Default)]
struct ItemState {
    enclosure: Option<Version>,
    deltas: Vec<Delta>,
}

/// Parse an `rss/channel/item*` document.
///
/// Every item must carry an enclosure with url, version, short version,
/// signature and length; nested `deltas/enclosure` entries additionally
/// need `deltaFrom`. Any violation fails the whole document.
pub fn parse_appcast(xml: &str) -> std::result::Result<Vec<Version>, String> {
    let mut reader = Reader::from_str(xml);
    let mut path: Vec<String> = Vec::new();
    let mut item: Option<ItemState> = None;
    let mut versions = Vec::new();
    let mut saw_rss = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|err| format!("XML error at byte {}: {err}", reader.buffer_position()))?;
        match event {
            Event::Start(element) => {
                let name = local_name(&element);
                if path.is_empty() && name == "rss" {
                    saw_rss = true;
                }
                if name == "item" && in_channel(&path) {
                    item = Some(ItemState::default());
                }
                if name == "enclosure" {
                    handle_enclosure(&element, &path, &mut item)?;
                }
                path.push(name);
            }
            Event::Empty(element) => {
                let name = local_name(&element);
                if name == "enclosure" {
                    handle_enclosure(&element, &path, &mut item)?;
                } else if name == "item" && in_channel(&path) {
                    return Err("item without enclosure".to_string());
                }
            }
            Event::End(_) => {
                let closed = path.pop();
                if closed.as_deref() == Some("item") && in_channel(&path) {
                    let state = item.take().unwrap_or_default();
                    let version = state
                        .enclosure
                        .ok_or_else(|| "item without enclosure".to_string())?;
                    if let Some(stray) = state
                        .deltas
                        .iter()
                        .find(|delta| delta.to_version != version.version)
                    {
                        return Err(format!(
                            "delta {} targets {} inside item {}",
                            stray.identifier(),
                            stray.to_version,
                            version.version
                        ));
                    }
                    versions.push(version.with_deltas(state.deltas));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_rss {
        return Err("document root is not <rss>".to_string());
    }
    if let Some(open) = path.last() {
        return Err(format!("document ends inside <{open}>"));
    }
    Ok(versions)
}

fn local_name(element: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(element.local_name().as_ref()).into_owned()
}

fn in_channel(path: &[String]) -> bool {
    matches!(path, [rss, channel] if rss == "rss" && channel == "channel")
}

fn in_item(path: &[String]) -> bool {
    matches!(path, [rss, channel, item] if rss == "rss" && channel == "channel" && item == "item")
}

fn in_item_deltas(path: &[String]) -> bool {
    matches!(path, [rss, channel, item, deltas]
        if rss == "rss" && channel == "channel" && item == "item" && deltas == "deltas")
}

fn handle_enclosure(
    element: &BytesStart<'_>,
    path: &[String],
    item: &mut Option<ItemState>,
) -> std::result::Result<(), String> {
    let Some(state) = item.as_mut() else {
        return Ok(());
    };
    if in_item(path) {
        if state.enclosure.is_some() {
            return Err("item with more than one enclosure".to_string());
        }
        state.enclosure = Some(parse_version(element)?);
    } else if in_item_deltas(path) {
        state.deltas.push(parse_delta(element)?);
    }
    Ok(())
}

fn enclosure_attributes(
    element: &BytesStart<'_>,
) -> std::result::Result<HashMap<String, String>, String> {
    let mut attributes = HashMap::new();
    for attribute in element.attributes() {
        let attribute = attribute.map_err(|err| format!("bad enclosure attribute: {err}"))?;
        let key = String::from_utf8_lossy(attribute.key.local_name().as_ref()).into_owned();
        let value = attribute
            .unescape_value()
            .map_err(|err| format!("bad value for `{key}`: {err}"))?
            .into_owned();
        attributes.insert(key, value);
    }
    Ok(attributes)
}

fn required<'a>(
    attributes: &'a HashMap<String, String>,
    key: &str,
    context: &str,
) -> std::result::Result<&'a str, String> {
    attributes
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| format!("{context} is missing required attribute `{key}`"))
}

/// Version ids name files in the working directory.
fn file_safe<'a>(raw: &'a str, context: &str) -> std::result::Result<&'a str, String> {
    if raw.is_empty() || raw == "." || raw == ".." || raw.contains(['/', '\\']) {
        return Err(format!("{context} has unusable version id `{raw}`"));
    }
    Ok(raw)
}

fn parse_url(raw: &str, context: &str) -> std::result::Result<Url, String> {
    Url::parse(raw).map_err(|err| format!("{context} has invalid url `{raw}`: {err}"))
}

fn parse_length(raw: &str, context: &str) -> std::result::Result<u64, String> {
    raw.trim()
        .parse::<u64>()
        .map_err(|err| format!("{context} has invalid length `{raw}`: {err}"))
}

fn parse_version(element: &BytesStart<'_>) -> std::result::Result<Version, String> {
    let attributes = enclosure_attributes(element)?;
    let version = file_safe(required(&attributes, ATTR_VERSION, "enclosure")?, "enclosure")?;
    let context = format!("enclosure for {version}");

    let url = parse_url(required(&attributes, ATTR_URL, &context)?, &context)?;
    let short_version = required(&attributes, ATTR_SHORT_VERSION, &context)?;
    let signature = required(&attributes, ATTR_SIGNATURE, &context)?;
    let length = parse_length(required(&attributes, ATTR_LENGTH, &context)?, &context)?;

    Ok(Version::remote(
        version.to_string(),
        short_version.to_string(),
        signature.to_string(),
        length,
        url,
    ))
}

fn parse_delta(element: &BytesStart<'_>) -> std::result::Result<Delta, String> {
    let attributes = enclosure_attributes(element)?;
    let to_version = required(&attributes, ATTR_VERSION, "delta enclosure")?;
    let from_version = required(&attributes, ATTR_DELTA_FROM, "delta enclosure")?;
    file_safe(to_version, "delta enclosure")?;
    file_safe(from_version, "delta enclosure")?;
    let context = format!("delta enclosure {from_version}--{to_version}");

    let url = parse_url(required(&attributes, ATTR_URL, &context)?, &context)?;
    let signature = required(&attributes, ATTR_SIGNATURE, &context)?;
    let length = parse_length(required(&attributes, ATTR_LENGTH, &context)?, &context)?;

    Delta::new(
        from_version.to_string(),
        to_version.to_string(),
        url,
        signature.to_string(),
        length,
    )
    .ok_or_else(|| format!("{context} patches a version onto itself"))
}
