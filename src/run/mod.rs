//! CP-010: External tool invocation.
//!
//! Materializes content handles as temp files, invokes external programs
//! argv-style (no shell), captures their output, and wraps captured stdout
//! as new content. The engine does not interpret tool semantics; a non-zero
//! exit simply becomes a step failure carrying the captured diagnostics.

use std::path::Path;

use tokio::process::Command;

use crate::core::content::Content;
use crate::core::error::StepError;

/// Captured output of an external program.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Run a program to completion, capturing stdout and stderr. The worker
/// driving this step stays occupied for the call's duration; pool size is
/// the only backpressure against process-heavy steps.
pub async fn run_tool(program: &str, args: &[String]) -> Result<ToolOutput, StepError> {
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| StepError::ToolSpawn {
            program: program.to_string(),
            source: e,
        })?;

    Ok(ToolOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: output.stdout,
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

/// Run a program and wrap its stdout as new content. Non-zero exit becomes
/// a `Tool` failure with the captured stderr.
pub async fn pipe_out(program: &str, args: &[String]) -> Result<Content, StepError> {
    let out = run_tool(program, args).await?;
    if !out.success() {
        return Err(StepError::Tool {
            command: format!("{} {}", program, args.join(" ")),
            code: out.exit_code,
            stderr: out.stderr,
        });
    }
    Ok(Content::from_bytes(out.stdout))
}

/// Run mapshaper over one input, piping GeoJSON back out. The input is
/// materialized as a temp file owned by its handle.
pub async fn mapshaper(input: &Content, args: &[&str]) -> Result<Content, StepError> {
    let tmp = input.to_temp_file()?;
    let mut argv: Vec<String> = vec!["-i".to_string(), tmp.display().to_string()];
    argv.extend(args.iter().map(|a| a.to_string()));
    argv.extend(
        [
            "-o",
            "-",
            "format=geojson",
            "geojson-type=FeatureCollection",
            "precision=0.00000001",
        ]
        .iter()
        .map(|a| a.to_string()),
    );
    pipe_out("mapshaper", &argv).await
}

/// Convert a vector source (e.g. a GeoPackage) to GeoJSON via ogr2ogr. The
/// converted file is owned by the returned handle and deleted at its
/// release.
pub async fn ogr2ogr(input: &Path) -> Result<Content, StepError> {
    let out = tempfile::Builder::new()
        .prefix("capas-")
        .suffix(".geojson")
        .tempfile()?
        .into_temp_path();

    let argv: Vec<String> = vec![
        "-f".to_string(),
        "GeoJSON".to_string(),
        out.display().to_string(),
        input.display().to_string(),
        "-dim".to_string(),
        "XY".to_string(),
        "-mapFieldType".to_string(),
        "DateTime=String".to_string(),
    ];
    let result = run_tool("ogr2ogr", &argv).await?;
    if !result.success() {
        return Err(StepError::Tool {
            command: format!("ogr2ogr {}", input.display()),
            code: result.exit_code,
            stderr: result.stderr,
        });
    }
    Ok(Content::from_temp(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cp010_run_tool_captures_stdout() {
        let out = run_tool("echo", &["hello".to_string()]).await.unwrap();
        assert!(out.success());
        assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "hello");
    }

    #[tokio::test]
    async fn test_cp010_run_tool_exit_code() {
        let out = run_tool("sh", &["-c".to_string(), "exit 42".to_string()])
            .await
            .unwrap();
        assert!(!out.success());
        assert_eq!(out.exit_code, 42);
    }

    #[tokio::test]
    async fn test_cp010_run_tool_captures_stderr() {
        let out = run_tool("sh", &["-c".to_string(), "echo oops >&2".to_string()])
            .await
            .unwrap();
        assert!(out.success());
        assert!(out.stderr.contains("oops"));
    }

    #[tokio::test]
    async fn test_cp010_spawn_failure() {
        let err = run_tool("capas-definitely-not-installed", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::ToolSpawn { .. }));
    }

    #[tokio::test]
    async fn test_cp010_pipe_out_wraps_stdout() {
        let content = pipe_out("sh", &["-c".to_string(), "printf '{\"n\":1}'".to_string()])
            .await
            .unwrap();
        let doc = content.to_doc().unwrap();
        assert_eq!(doc["n"], 1);
    }

    #[tokio::test]
    async fn test_cp010_pipe_out_failure_carries_diagnostics() {
        let err = pipe_out(
            "sh",
            &["-c".to_string(), "echo broken >&2; exit 3".to_string()],
        )
        .await
        .unwrap_err();
        match err {
            StepError::Tool { code, stderr, .. } => {
                assert_eq!(code, 3);
                assert!(stderr.contains("broken"));
            }
            other => panic!("expected Tool error, got {}", other),
        }
    }

    #[tokio::test]
    async fn test_cp010_tool_reads_materialized_input() {
        // Stands in for mapshaper/ogr2ogr: any tool fed a materialized
        // temp file sees the handle's bytes.
        let content = Content::from_bytes(b"{\"ok\":true}".to_vec());
        content.bind("x.step", 2);
        let tmp = content.to_temp_file().unwrap();
        let out = pipe_out("cat", &[tmp.display().to_string()]).await.unwrap();
        assert_eq!(out.to_bytes().unwrap(), b"{\"ok\":true}");
    }
}
