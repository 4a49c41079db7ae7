//! Sound pack descriptor parsing
//!
//! Descriptor keys:
//! - `key_define_type`: `"single"` (default) or `"multi"`
//! - `sound` (legacy `audio_file`): shared sample, or the generic press
//!   file pattern in multi mode (`%d` or `{N}` placeholder)
//! - `soundup`: generic release file (multi mode)
//! - `defines` (legacy `definitions`): per-code bindings

use keyvibe_common::device::{named_code, KEY_CODE_LIMIT};
use keyvibe_common::KeyCode;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{Layout, MultiLayout, Segment, SingleLayout, MAX_GENERIC_PRESS_FILES};
use crate::error::{Error, Result};

pub(super) fn load_layout(descriptor_path: &Path) -> Result<Layout> {
    let text = fs::read_to_string(descriptor_path).map_err(|e| {
        Error::Config(format!(
            "Cannot open sound pack config {}: {}",
            descriptor_path.display(),
            e
        ))
    })?;

    let root: Value = serde_json::from_str(&text).map_err(|e| {
        Error::Config(format!(
            "Invalid JSON in sound pack config {}: {}",
            descriptor_path.display(),
            e
        ))
    })?;

    let root = root.as_object().ok_or_else(|| {
        Error::Config(format!(
            "Sound pack config {} is not a JSON object",
            descriptor_path.display()
        ))
    })?;

    let base_dir = descriptor_path.parent().unwrap_or_else(|| Path::new(""));
    Ok(parse_layout(root, base_dir))
}

pub(super) fn parse_layout(root: &Map<String, Value>, base_dir: &Path) -> Layout {
    let is_multi = root.get("key_define_type").and_then(Value::as_str) == Some("multi");
    debug!(
        "Sound pack uses {} mode",
        if is_multi { "multi" } else { "single" }
    );

    if is_multi {
        Layout::Multi(parse_multi(root, base_dir))
    } else {
        Layout::Single(parse_single(root, base_dir))
    }
}

fn string_field<'a>(root: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| root.get(*key)).and_then(Value::as_str)
}

fn defines(root: &Map<String, Value>) -> Option<&Map<String, Value>> {
    root.get("defines")
        .or_else(|| root.get("definitions"))
        .and_then(Value::as_object)
}

/// Absolute names are kept; relative names resolve against the pack directory
fn full_path(base_dir: &Path, name: &str) -> PathBuf {
    let path = Path::new(name);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn is_readable(path: &Path) -> bool {
    fs::File::open(path).is_ok()
}

fn valid_code(code: KeyCode) -> Option<KeyCode> {
    (code < KEY_CODE_LIMIT).then_some(code)
}

fn parse_single(root: &Map<String, Value>, base_dir: &Path) -> SingleLayout {
    let mut layout = SingleLayout {
        sound_file: string_field(root, &["sound", "audio_file"]).map(|s| full_path(base_dir, s)),
        ..SingleLayout::default()
    };
    if let Some(file) = &layout.sound_file {
        debug!("Single mode sound file: {}", file.display());
    }

    let Some(defines) = defines(root) else {
        return layout;
    };

    for (key, value) in defines {
        let code = named_code(key).or_else(|| key.parse::<KeyCode>().ok().and_then(valid_code));
        let Some(code) = code else {
            if !key.ends_with("-up") {
                warn!("Ignoring sound pack binding with unknown key '{}'", key);
            }
            continue;
        };

        match parse_timing(value) {
            Some(segment) if segment.duration_ms > 0 => {
                layout.segments.insert(code, segment);
            }
            Some(_) => {}
            None => debug!("Ignoring unusable timing for key '{}'", key),
        }
    }

    debug!("Single mode bindings: {}", layout.segments.len());
    layout
}

/// `[start, duration]` or `{"timing": [[start, duration], ...]}` (first entry only)
fn parse_timing(value: &Value) -> Option<Segment> {
    let pair = match value {
        Value::Array(_) => value,
        Value::Object(obj) => obj.get("timing")?.as_array()?.first()?,
        _ => return None,
    };

    let items = pair.as_array()?;
    if items.len() < 2 {
        return None;
    }
    Some(Segment {
        start_ms: millis(&items[0])?,
        duration_ms: millis(&items[1])?,
    })
}

fn millis(value: &Value) -> Option<u32> {
    let ms = value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f.trunc() as i64))?;
    u32::try_from(ms).ok()
}

fn parse_multi(root: &Map<String, Value>, base_dir: &Path) -> MultiLayout {
    let mut layout = MultiLayout::default();

    if let Some(pattern) = string_field(root, &["sound", "audio_file"]) {
        debug!("Sound pattern: {}", pattern);
        layout.generic_press = discover_generic_files(pattern, base_dir);
        debug!(
            "Total generic press sound files: {}",
            layout.generic_press.len()
        );
    }

    if let Some(release) = string_field(root, &["soundup"]) {
        let file = full_path(base_dir, release);
        debug!("Release sound file: {}", file.display());
        layout.generic_release = Some(file);
    }

    let Some(defines) = defines(root) else {
        return layout;
    };

    for (key, value) in defines {
        let Some((code, release)) = parse_multi_key(key) else {
            warn!("Ignoring sound pack binding with unknown key '{}'", key);
            continue;
        };
        let Some(name) = value.as_str() else {
            warn!("Ignoring non-string file binding for key '{}'", key);
            continue;
        };

        let file = full_path(base_dir, name);
        if release {
            layout.release.insert(code, file);
        } else {
            layout.press.insert(code, file);
        }
    }

    layout
}

/// Returns the code and whether the binding is for the release edge
fn parse_multi_key(key: &str) -> Option<(KeyCode, bool)> {
    if let Some(code) = named_code(key) {
        return Some((code, false));
    }
    if let Some(prefix) = key.strip_suffix("-up") {
        let code = named_code(prefix).or_else(|| prefix.parse().ok().and_then(valid_code))?;
        return Some((code, true));
    }
    let code = key.parse().ok().and_then(valid_code)?;
    Some((code, false))
}

/// Expand the generic press pattern for indices 0..5.
///
/// Discovery stops at the first index whose file is not readable, so a gap
/// hides every later index. Expansions that repeat an earlier path are
/// skipped. A pattern without a placeholder names a single candidate.
pub(super) fn discover_generic_files(pattern: &str, base_dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();

    if !(pattern.contains("%d") || pattern.contains('{')) {
        let file = full_path(base_dir, pattern);
        if is_readable(&file) {
            debug!("Found single generic sound file: {}", file.display());
            files.push(file);
        }
        return files;
    }

    for index in 0..MAX_GENERIC_PRESS_FILES {
        let file = full_path(base_dir, &expand_pattern(pattern, index));
        if !is_readable(&file) {
            debug!("Generic sound file not found: {}", file.display());
            break;
        }
        if !files.contains(&file) {
            files.push(file);
        }
    }

    files
}

/// Substitute `index` for the first `{...}` group, or else the first `%d`
fn expand_pattern(pattern: &str, index: usize) -> String {
    if let Some(open) = pattern.find('{') {
        return match pattern[open..].find('}') {
            Some(len) => format!(
                "{}{}{}",
                &pattern[..open],
                index,
                &pattern[open + len + 1..]
            ),
            None => pattern.to_string(),
        };
    }
    pattern.replacen("%d", &index.to_string(), 1)
}
