//! Script bodies are handed to the scheduler as files (`add ... -f <file>`,
//! `edit <id> script <file>`). They are staged under `bin/scripts`.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::binary::{REPAIRED_MODE, set_mode};

const DEFAULT_SHEBANG: &str = "#!/bin/bash\n";

/// Converts CRLF line endings and prepends `#!/bin/bash` when the body has no
/// shebang.
#[must_use]
pub fn normalize_script(body: &str) -> String {
    let body = body.replace("\r\n", "\n");
    if body.trim_start().starts_with("#!/") {
        body
    } else {
        format!("{DEFAULT_SHEBANG}{body}")
    }
}

/// Writes a normalized script to a fresh `script_*.sh` file in `dir` and
/// marks it executable. The file is kept; the scheduler reads it later.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be created or written.
pub fn stage_script(dir: &Path, body: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

    let mut file = tempfile::Builder::new()
        .prefix("script_")
        .suffix(".sh")
        .tempfile_in(dir)
        .context("Failed to create script file")?;
    file.write_all(normalize_script(body).as_bytes())
        .context("Failed to write script file")?;

    let (_, path) = file.keep().context("Failed to keep script file")?;
    set_mode(&path, REPAIRED_MODE)
        .with_context(|| format!("Failed to set permissions on {}", path.display()))?;

    debug!(path = %path.display(), "staged script");
    Ok(path)
}
