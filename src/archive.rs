//! Version stamping of plugin archives.
//!
//! A plugin jar carries a yaml descriptor at its root. On upload the
//! descriptor's `version` is replaced with `"<channel> - <build>"` and the
//! archive is written back out. Every other entry is raw-copied, so its
//! compressed bytes and headers are untouched, and the descriptor entry is
//! written with fixed compression settings. The same input therefore always
//! produces the same output, which matters because the output hash is the
//! storage key.

use std::io::{Cursor, Read, Write};

use serde_yaml::{Mapping, Value};
use zip::{
  CompressionMethod, ZipArchive, ZipWriter, result::ZipError,
  write::SimpleFileOptions,
};

/// Descriptor names in lookup order, first match wins.
pub const DESCRIPTOR_NAMES: [&str; 4] =
  ["plugin.yml", "plugin.yaml", "paper-plugin.yml", "paper-plugin.yaml"];

const DESCRIPTOR_COMPRESSION_LEVEL: i64 = 6;

/// Inflated size cap for the descriptor entry.
pub const MAX_DESCRIPTOR_BYTES: u64 = 1 << 20;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
  #[error("not a valid zip archive: {0}")]
  Zip(#[from] ZipError),

  #[error("no plugin descriptor found, expected one of {DESCRIPTOR_NAMES:?}")]
  MetadataFileNotFound,

  #[error("`{0}` has no version field")]
  VersionFieldMissing(String),

  #[error("`{file}` is not a valid plugin descriptor: {reason}")]
  InvalidDescriptor { file: String, reason: String },

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

/// A parsed plugin descriptor.
///
/// Kept as the raw mapping so keys stay in their original order when it is
/// written back. Comments do not survive a rewrite.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginDescriptor {
  fields: Mapping,
}

impl PluginDescriptor {
  pub fn parse(file: &str, text: &str) -> Result<Self, ArchiveError> {
    if text.trim().is_empty() {
      return Err(ArchiveError::VersionFieldMissing(file.to_string()));
    }

    let invalid = |reason: String| ArchiveError::InvalidDescriptor {
      file: file.to_string(),
      reason,
    };

    match serde_yaml::from_str(text) {
      Ok(Value::Mapping(fields)) => Ok(Self { fields }),
      Ok(Value::Null) => Err(ArchiveError::VersionFieldMissing(file.into())),
      Ok(_) => Err(invalid("expected a mapping at the top level".into())),
      Err(err) => Err(invalid(err.to_string())),
    }
  }

  /// `version: ~` counts as present.
  pub fn has_version(&self) -> bool {
    self.fields.contains_key("version")
  }

  /// Replaces the version value, keeping the key where it was.
  pub fn set_version(&mut self, version: &str) {
    self.fields.insert("version".into(), Value::String(version.to_string()));
  }

  pub fn to_yaml(&self, file: &str) -> Result<String, ArchiveError> {
    serde_yaml::to_string(&self.fields).map_err(|err| {
      ArchiveError::InvalidDescriptor {
        file: file.to_string(),
        reason: err.to_string(),
      }
    })
  }
}

/// The version string stamped into a build's descriptor.
pub fn stamp(channel: &str, build_id: i32) -> String {
  format!("{channel} - {build_id}")
}

/// Rewrites the descriptor `version` of `archive` to `version`.
pub fn rewrite_version(
  archive: &[u8],
  version: &str,
) -> Result<Vec<u8>, ArchiveError> {
  let mut source = ZipArchive::new(Cursor::new(archive))?;

  let (index, file) = DESCRIPTOR_NAMES
    .iter()
    .find_map(|name| source.index_for_name(name).map(|idx| (idx, *name)))
    .ok_or(ArchiveError::MetadataFileNotFound)?;

  let (text, unix_mode, modified) = {
    let mut entry = source.by_index(index)?;
    // the declared size comes from the uploader, only trust what inflates
    let mut raw = Vec::new();
    (&mut entry).take(MAX_DESCRIPTOR_BYTES + 1).read_to_end(&mut raw)?;
    if raw.len() as u64 > MAX_DESCRIPTOR_BYTES {
      return Err(ArchiveError::InvalidDescriptor {
        file: file.to_string(),
        reason: format!("larger than {MAX_DESCRIPTOR_BYTES} bytes"),
      });
    }

    let text =
      String::from_utf8(raw).map_err(|_| ArchiveError::InvalidDescriptor {
        file: file.to_string(),
        reason: "not valid utf-8".to_string(),
      })?;
    (text, entry.unix_mode(), entry.last_modified().unwrap_or_default())
  };

  let mut descriptor = PluginDescriptor::parse(file, &text)?;
  if !descriptor.has_version() {
    return Err(ArchiveError::VersionFieldMissing(file.to_string()));
  }
  descriptor.set_version(version);
  let rewritten = descriptor.to_yaml(file)?;

  let mut options = SimpleFileOptions::default()
    .compression_method(CompressionMethod::Deflated)
    .compression_level(Some(DESCRIPTOR_COMPRESSION_LEVEL))
    .last_modified_time(modified);
  if let Some(mode) = unix_mode {
    options = options.unix_permissions(mode);
  }

  let mut writer = ZipWriter::new(Cursor::new(Vec::with_capacity(
    archive.len() + rewritten.len(),
  )));

  // entry order is preserved, the descriptor stays where it was found
  for idx in 0..source.len() {
    if idx == index {
      writer.start_file(file, options)?;
      writer.write_all(rewritten.as_bytes())?;
    } else {
      writer.raw_copy_file(source.by_index(idx)?)?;
    }
  }

  Ok(writer.finish()?.into_inner())
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;

  /// Builds a small jar with the given `(name, content)` entries.
  pub fn jar(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default()
      .compression_method(CompressionMethod::Deflated);

    for (name, content) in entries {
      writer.start_file(*name, options).unwrap();
      writer.write_all(content.as_bytes()).unwrap();
    }

    writer.finish().unwrap().into_inner()
  }

  pub fn plugin_jar(version: &str) -> Vec<u8> {
    jar(&[
      ("META-INF/MANIFEST.MF", "Manifest-Version: 1.0\n"),
      (
        "plugin.yml",
        &format!(
          "name: Demo\nversion: {version}\nmain: dev.demo.Main\n\
           api-version: '1.20'\ndepend:\n- Vault\n"
        ),
      ),
      ("dev/demo/Main.class", "\u{ca}\u{fe}\u{ba}\u{be} bytecode"),
    ])
  }

  fn read_descriptor(
    archive: &[u8],
  ) -> Result<(String, PluginDescriptor), ArchiveError> {
    let mut source = ZipArchive::new(Cursor::new(archive))?;

    for name in DESCRIPTOR_NAMES {
      let Some(index) = source.index_for_name(name) else { continue };

      let mut text = String::new();
      source.by_index(index)?.read_to_string(&mut text)?;
      return Ok((name.to_string(), PluginDescriptor::parse(name, &text)?));
    }

    Err(ArchiveError::MetadataFileNotFound)
  }

  fn entries(archive: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut source = ZipArchive::new(Cursor::new(archive)).unwrap();
    (0..source.len())
      .map(|idx| {
        let mut entry = source.by_index(idx).unwrap();
        let mut content = Vec::new();
        entry.read_to_end(&mut content).unwrap();
        (entry.name().to_string(), content)
      })
      .collect()
  }

  #[test]
  fn test_stamp() {
    assert_eq!(stamp("Dev", 3), "Dev - 3");
  }

  #[test]
  fn test_rewrite_version() {
    let original = plugin_jar("1.0");
    let rewritten = rewrite_version(&original, "Dev - 3").unwrap();

    let (file, PluginDescriptor { fields }) =
      read_descriptor(&rewritten).unwrap();
    assert_eq!(file, "plugin.yml");
    assert_eq!(fields.get("version"), Some(&Value::from("Dev - 3")));
    assert_eq!(fields.get("name"), Some(&Value::from("Demo")));
    assert_eq!(fields.get("main"), Some(&Value::from("dev.demo.Main")));

    // unknown keys survive
    assert_eq!(fields.get("api-version"), Some(&Value::from("1.20")));
    assert!(fields.get("depend").is_some());

    // every other entry is untouched, order included
    let before = entries(&original);
    let after = entries(&rewritten);
    assert_eq!(before.len(), after.len());
    for ((name_a, data_a), (name_b, data_b)) in before.iter().zip(&after) {
      assert_eq!(name_a, name_b);
      if name_a != "plugin.yml" {
        assert_eq!(data_a, data_b);
      }
    }
  }

  #[test]
  fn test_rewrite_is_deterministic() {
    let original = plugin_jar("1.0");

    let first = rewrite_version(&original, "Dev - 3").unwrap();
    let second = rewrite_version(&original, "Dev - 3").unwrap();
    assert_eq!(first, second);

    let other = rewrite_version(&original, "Dev - 4").unwrap();
    assert_ne!(first, other);
  }

  #[test]
  fn test_fallback_descriptor_name() {
    let original = jar(&[
      ("paper-plugin.yaml", "name: Paper\nversion: 0.1\n"),
      ("a.txt", "a"),
    ]);
    let rewritten = rewrite_version(&original, "Release - 1").unwrap();

    let (file, PluginDescriptor { fields }) =
      read_descriptor(&rewritten).unwrap();
    assert_eq!(file, "paper-plugin.yaml");
    assert_eq!(fields.get("version"), Some(&Value::from("Release - 1")));
  }

  #[test]
  fn test_key_order_is_kept() {
    let original = jar(&[(
      "plugin.yml",
      "main: dev.demo.Main\nauthors:\n- someone\nversion: 1.0\nname: Demo\n",
    )]);
    let rewritten = rewrite_version(&original, "Dev - 5").unwrap();

    let text = String::from_utf8(entries(&rewritten).remove(0).1).unwrap();
    let keys: Vec<_> = text
      .lines()
      .filter(|line| !line.starts_with(['-', ' ']))
      .filter_map(|line| line.split(':').next())
      .collect();
    assert_eq!(keys, ["main", "authors", "version", "name"]);
    assert!(text.contains("version: Dev - 5\n"));
  }

  #[test]
  fn test_null_version_is_stamped() {
    let original = jar(&[("plugin.yml", "name: Demo\nversion: ~\n")]);
    let rewritten = rewrite_version(&original, "Dev - 1").unwrap();

    let (_, PluginDescriptor { fields }) =
      read_descriptor(&rewritten).unwrap();
    assert_eq!(fields.get("version"), Some(&Value::from("Dev - 1")));
  }

  #[test]
  fn test_oversized_descriptor() {
    let padding = "#".repeat(MAX_DESCRIPTOR_BYTES as usize);
    let original =
      jar(&[("plugin.yml", &format!("version: 1\n{padding}\n"))]);
    // deflate squeezes the padding to almost nothing
    assert!(original.len() < 64 * 1024);

    assert!(matches!(
      rewrite_version(&original, "Dev - 1"),
      Err(ArchiveError::InvalidDescriptor { file, .. }) if file == "plugin.yml"
    ));

    let fits = "#".repeat(1024);
    let original = jar(&[("plugin.yml", &format!("version: 1\n{fits}\n"))]);
    assert!(rewrite_version(&original, "Dev - 1").is_ok());
  }

  #[test]
  fn test_descriptor_priority() {
    let original = jar(&[
      ("paper-plugin.yml", "version: 9\n"),
      ("plugin.yml", "version: 1\n"),
    ]);
    let rewritten = rewrite_version(&original, "Dev - 2").unwrap();

    let names: Vec<_> =
      entries(&rewritten).into_iter().map(|(name, _)| name).collect();
    assert_eq!(names, ["paper-plugin.yml", "plugin.yml"]);

    let paper = &entries(&rewritten)[0].1;
    assert_eq!(paper.as_slice(), b"version: 9\n");
  }

  #[test]
  fn test_missing_descriptor() {
    let original = jar(&[("config.yml", "version: 1\n")]);
    assert!(matches!(
      rewrite_version(&original, "Dev - 1"),
      Err(ArchiveError::MetadataFileNotFound)
    ));
  }

  #[test]
  fn test_missing_version() {
    let original = jar(&[("plugin.yml", "name: Demo\nmain: a.B\n")]);
    assert!(matches!(
      rewrite_version(&original, "Dev - 1"),
      Err(ArchiveError::VersionFieldMissing(file)) if file == "plugin.yml"
    ));

    let empty = jar(&[("plugin.yml", "")]);
    assert!(matches!(
      rewrite_version(&empty, "Dev - 1"),
      Err(ArchiveError::VersionFieldMissing(_))
    ));
  }

  #[test]
  fn test_invalid_descriptor() {
    let original = jar(&[("plugin.yml", "- just\n- a list\n")]);
    assert!(matches!(
      rewrite_version(&original, "Dev - 1"),
      Err(ArchiveError::InvalidDescriptor { .. })
    ));
  }

  #[test]
  fn test_not_a_zip() {
    assert!(matches!(
      rewrite_version(b"definitely not a jar", "Dev - 1"),
      Err(ArchiveError::Zip(_))
    ));
  }
}
