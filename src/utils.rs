use crate::prelude::*;

const MAX_NAME_LEN: usize = 64;

/// Project, channel and user names end up in storage paths and urls.
pub fn validate_name(name: &str) -> Result<()> {
  let valid = !name.is_empty()
    && name.len() <= MAX_NAME_LEN
    && name
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    && !name.starts_with('.');

  if valid {
    Ok(())
  } else {
    Err(Error::InvalidName(format!(
      "`{name}` must be 1-{MAX_NAME_LEN} characters of [A-Za-z0-9._-] \
       and must not start with a dot"
    )))
  }
}

/// Renders a channel file naming template.
///
/// Supported tokens: `$project`, `$release`, `$build`.
pub fn render_file_name(
  template: &str,
  project: &str,
  channel: &str,
  build_id: i32,
) -> String {
  template
    .replace("$project", project)
    .replace("$release", channel)
    .replace("$build", &build_id.to_string())
}
