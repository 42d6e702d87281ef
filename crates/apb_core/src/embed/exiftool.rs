//! ExifTool command wrapper.
//!
//! Provides the [`MetadataWriter`] seam used by the embedder, and the
//! ExifTool implementation behind it. One process is spawned per file.

use std::cmp::Ordering;
use std::env;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;

/// Errors from the external metadata tool.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("{tool} not found (configured path: '{configured}')")]
    NotFound { tool: String, configured: String },

    #[error("{tool} version {found} is older than required {required}")]
    VersionTooOld {
        tool: String,
        found: String,
        required: String,
    },

    #[error("Could not read {tool} version: {message}")]
    VersionUnreadable { tool: String, message: String },

    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{tool} failed on {file} (exit code {exit_code}): {message}")]
    Failed {
        tool: String,
        file: PathBuf,
        exit_code: i32,
        message: String,
        /// Everything the tool printed.
        output: ToolOutput,
    },
}

/// Captured output of one tool run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Command line as run, for logs.
    pub command: String,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// All output lines, stderr flagged.
    pub fn lines(&self) -> impl Iterator<Item = (&str, bool)> {
        self.stdout
            .lines()
            .map(|l| (l, false))
            .chain(self.stderr.lines().map(|l| (l, true)))
    }
}

/// Writes tag arguments into files.
///
/// `tag_args` are ExifTool-style `-TAG=VALUE` arguments. Implementations
/// must treat one call as all-or-nothing for that file.
pub trait MetadataWriter: Send + Sync {
    /// Short description for logs (program and version).
    fn describe(&self) -> String;

    /// Write `tag_args` into `target` in place.
    fn write_tags(&self, target: &Path, tag_args: &[String]) -> Result<ToolOutput, ToolError>;

    /// Copy every tag from `source` into `target`.
    fn copy_tags(&self, source: &Path, target: &Path) -> Result<ToolOutput, ToolError>;
}

const TOOL: &str = "exiftool";

/// A located and version-checked ExifTool.
#[derive(Debug, Clone)]
pub struct ExifTool {
    program: PathBuf,
    version: String,
}

impl ExifTool {
    /// Locate ExifTool and check its version.
    ///
    /// `configured` is a path from settings; empty means search `PATH`.
    pub fn locate(configured: &str, min_version: &str) -> Result<Self, ToolError> {
        let program = resolve_program(configured).ok_or_else(|| ToolError::NotFound {
            tool: TOOL.to_string(),
            configured: configured.to_string(),
        })?;

        let output = Command::new(&program)
            .arg("-ver")
            .output()
            .map_err(|e| ToolError::Spawn {
                program: program.clone(),
                source: e,
            })?;
        if !output.status.success() {
            return Err(ToolError::VersionUnreadable {
                tool: TOOL.to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if version.is_empty() || !version.chars().next().is_some_and(|c| c.is_ascii_digit()) {
            return Err(ToolError::VersionUnreadable {
                tool: TOOL.to_string(),
                message: format!("unexpected output '{}'", version),
            });
        }

        if compare_versions(&version, min_version) == Ordering::Less {
            return Err(ToolError::VersionTooOld {
                tool: TOOL.to_string(),
                found: version,
                required: min_version.to_string(),
            });
        }

        tracing::debug!(program = %program.display(), %version, "Located exiftool");
        Ok(Self { program, version })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    fn run(&self, target: &Path, args: &[String]) -> Result<ToolOutput, ToolError> {
        let command = format!(
            "{} {} {}",
            self.program.display(),
            args.join(" "),
            target.display()
        );
        tracing::debug!("Running: {}", command);

        let output = Command::new(&self.program)
            .args(args)
            .arg(target)
            .output()
            .map_err(|e| ToolError::Spawn {
                program: self.program.clone(),
                source: e,
            })?;

        let captured = ToolOutput {
            command,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };

        if !output.status.success() || reports_nothing_written(&captured.stdout) {
            let message = captured
                .stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("no files updated")
                .trim()
                .to_string();
            return Err(ToolError::Failed {
                tool: TOOL.to_string(),
                file: target.to_path_buf(),
                exit_code: output.status.code().unwrap_or(-1),
                message,
                output: captured,
            });
        }

        Ok(captured)
    }
}

impl MetadataWriter for ExifTool {
    fn describe(&self) -> String {
        format!("{} {}", self.program.display(), self.version)
    }

    fn write_tags(&self, target: &Path, tag_args: &[String]) -> Result<ToolOutput, ToolError> {
        let mut args = vec![
            "-overwrite_original".to_string(),
            "-charset".to_string(),
            "iptc=UTF8".to_string(),
        ];
        args.extend(tag_args.iter().cloned());
        self.run(target, &args)
    }

    fn copy_tags(&self, source: &Path, target: &Path) -> Result<ToolOutput, ToolError> {
        let args = vec![
            "-overwrite_original".to_string(),
            "-charset".to_string(),
            "iptc=UTF8".to_string(),
            "-TagsFromFile".to_string(),
            source.display().to_string(),
            "-all:all".to_string(),
        ];
        self.run(target, &args)
    }
}

/// ExifTool can exit 0 while reporting that no file was written.
fn reports_nothing_written(stdout: &str) -> bool {
    let mut zero_updated = false;
    for line in stdout.lines().map(str::trim) {
        if line.ends_with("image files unchanged") && !line.starts_with("0 ") {
            return false;
        }
        if line == "0 image files updated" {
            zero_updated = true;
        }
    }
    zero_updated
}

/// Resolve the tool path: a configured path if it exists, else `PATH`.
fn resolve_program(configured: &str) -> Option<PathBuf> {
    let configured = configured.trim();
    if !configured.is_empty() {
        let path = PathBuf::from(configured);
        if path.is_file() {
            return Some(path);
        }
        // A bare name like "exiftool.pl" is searched on PATH.
        if path.components().count() == 1 {
            return find_in_path(configured);
        }
        return None;
    }
    find_in_path(TOOL)
}

/// Find an executable on `PATH`.
pub fn find_in_path(name: &str) -> Option<PathBuf> {
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths).find_map(|dir| {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
        if cfg!(windows) {
            let exe = dir.join(format!("{}.exe", name));
            if exe.is_file() {
                return Some(exe);
            }
        }
        None
    })
}

/// Compare dotted numeric versions ("12.4" < "12.40" < "13.0").
///
/// Components are compared as integers; missing components count as 0.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let parse = |v: &str| -> Vec<u64> {
        v.trim()
            .split('.')
            .map(|part| {
                part.chars()
                    .take_while(|c| c.is_ascii_digit())
                    .collect::<String>()
                    .parse()
                    .unwrap_or(0)
            })
            .collect()
    };
    let (a, b) = (parse(a), parse(b));
    let len = a.len().max(b.len());
    for i in 0..len {
        let (x, y) = (
            a.get(i).copied().unwrap_or(0),
            b.get(i).copied().unwrap_or(0),
        );
        match x.cmp(&y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn version_comparison() {
        assert_eq!(compare_versions("12.76", "10.80"), Ordering::Greater);
        assert_eq!(compare_versions("10.80", "10.80"), Ordering::Equal);
        assert_eq!(compare_versions("10.8", "10.80"), Ordering::Less);
        assert_eq!(compare_versions("10.80.0", "10.80"), Ordering::Equal);
        assert_eq!(compare_versions("9.99", "10.0"), Ordering::Less);
    }

    #[test]
    fn missing_configured_path_is_not_found() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope").join("exiftool");
        let err = ExifTool::locate(&missing.display().to_string(), "10.80").unwrap_err();
        assert!(matches!(err, ToolError::NotFound { .. }));
    }

    #[test]
    fn output_lines_flag_stderr() {
        let output = ToolOutput {
            command: "exiftool -ver".to_string(),
            stdout: "1 image files updated\n".to_string(),
            stderr: "Warning: minor\n".to_string(),
        };
        let lines: Vec<_> = output.lines().collect();
        assert_eq!(
            lines,
            vec![("1 image files updated", false), ("Warning: minor", true)]
        );
    }

    #[test]
    fn zero_updates_is_detected() {
        assert!(reports_nothing_written("    0 image files updated\n    1 files weren't updated due to errors\n"));
        assert!(!reports_nothing_written("    1 image files updated\n"));
        assert!(!reports_nothing_written("    0 image files updated\n    1 image files unchanged\n"));
    }

    #[test]
    fn find_in_path_misses_unknown_tools() {
        assert!(find_in_path("definitely-not-a-real-tool-4711").is_none());
    }
}
