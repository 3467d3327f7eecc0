//! Rendering of `desc.addpack` and `readme.txt`.
//!
//! The manifest follows the stencil the game ships in
//! `docs/modwork/stencil/desc_example.addpack.engcfg2`; when a game install lacks it
//! the built-in copy of the same stencil is used.

use crate::models::ModMetadata;
use crate::models::metadata::DEFAULT_MOD_NAME;
use camino::Utf8Path;
use regex::{NoExpand, Regex};
use std::fs;
use std::io;
use std::sync::LazyLock;

/// Stencil used when the game install does not provide one.
pub const BUILTIN_MANIFEST_TEMPLATE: &str = "\
i_addpack:addpack()
{
  name[*] = <My Addon>;
  author[*] = <Vasya Pupkin>;
  path[*] = <my_updates>;
  version[u] = 100;
  type[*] = RES;
}
";

pub const DEFAULT_DESCRIPTION: &str = "Replace this with your mod's description.";

static INVALID_NAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s_-]").expect("Invalid name sanitising regex"));
static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("Invalid whitespace regex"));
static VERSION_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"version\[u\]\s*=\s*\d+").expect("Invalid version field regex"));
static TYPE_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"type\[\*\]\s*=\s*\w+;").expect("Invalid type field regex"));

/// Folder-safe form of a mod name, used for the installer path `mods/<name>`.
pub fn sanitize_mod_name(name: &str) -> String {
    let replaced = INVALID_NAME_CHARS.replace_all(name, "_");
    let collapsed = WHITESPACE_RUN.replace_all(replaced.trim(), "_");
    if collapsed.is_empty() {
        DEFAULT_MOD_NAME.to_string()
    } else {
        collapsed.into_owned()
    }
}

/// Fill a manifest stencil with the mod's metadata.
pub fn render_manifest(template: &str, metadata: &ModMetadata) -> String {
    let installer_path = format!("mods/{}", sanitize_mod_name(&metadata.name));

    let content = template
        .replace("<my_updates>", &installer_path)
        .replace("<My Addon>", &metadata.name)
        .replace("<Vasya Pupkin>", &metadata.author);

    let version_line = format!("version[u] = {}", metadata.version);
    let mut content = VERSION_FIELD
        .replace_all(&content, NoExpand(&version_line))
        .into_owned();

    // Resource packs are RES; addons and campaigns keep their own type.
    if !content.contains("type[*] =") {
        content.push_str("\ntype[*] = RES;\n");
    } else if !content.contains("type[*] = ADDN") && !content.contains("type[*] = CAMP") {
        content = TYPE_FIELD
            .replace_all(&content, NoExpand("type[*] = RES;"))
            .into_owned();
    }

    content
}

/// Decode a stencil file: UTF-8 (BOM stripped) first, Windows-1251 otherwise.
pub fn decode_template(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            tracing::debug!("Manifest template is not UTF-8, decoding as Windows-1251");
            let (text, _, _) = encoding_rs::WINDOWS_1251.decode(bytes);
            text.into_owned()
        }
    }
}

/// Read the game's stencil, or `None` when the install does not have one.
pub fn load_template(path: &Utf8Path) -> io::Result<Option<String>> {
    if !path.is_file() {
        return Ok(None);
    }
    let bytes = fs::read(path)?;
    Ok(Some(decode_template(&bytes)))
}

pub fn render_readme(metadata: &ModMetadata, description: &str) -> String {
    format!(
        "Mod: {}\nAuthor: {}\nVersion: {}\n\nDescription:\n{}\n",
        metadata.name, metadata.author, metadata.version, description
    )
}

/// Description block of an existing readme, if it has a non-empty one.
pub fn existing_description(readme: &str) -> Option<String> {
    let mut lines = readme.lines();
    lines
        .by_ref()
        .find(|line| line.trim().to_lowercase().starts_with("description:"))?;

    let description = lines.collect::<Vec<_>>().join("\n");
    let description = description.trim();
    (!description.is_empty()).then(|| description.to_string())
}

/// Readme text for `metadata`, keeping the description of the file at `path`.
pub fn readme_for(path: &Utf8Path, metadata: &ModMetadata) -> String {
    let description = match fs::read_to_string(path) {
        Ok(current) => existing_description(&current),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => {
            tracing::warn!("Could not read {} to keep its description: {}", path, e);
            None
        }
    };
    render_readme(metadata, description.as_deref().unwrap_or(DEFAULT_DESCRIPTION))
}
