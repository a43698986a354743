//! Rscript analysis backend
//!
//! Runs the R analysis function in a child `Rscript` process:
//!
//! ```text
//! Rscript -e <driver> <script> <function> <matrix> <metadata|""> <prefix>
//! ```
//!
//! The driver sources the script, calls the function (an empty metadata
//! argument becomes `NULL`) and prints the first element of the returned
//! value on a line starting with [`FLAG_MARKER`]. `TRUE` means success; any
//! other flag is reported as a rejection carrying that value.
//!
//! The process runs with the storage root as its working directory, so the
//! routine's relative output paths land in `images/` and `processed_files/`.

use async_trait::async_trait;
use scdha_common::config::AnalysisConfig;
use scdha_common::ArtifactSet;
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use super::{AnalysisBackend, AnalysisError, AnalysisJob};

/// Prefix of the stdout line carrying the result flag
pub const FLAG_MARKER: &str = "SCDHA_FLAG=";

const DRIVER: &str = r#"args <- commandArgs(trailingOnly = TRUE)
source(args[1])
analysis <- get(args[2])
metadata <- if (nzchar(args[4])) args[4] else NULL
res <- analysis(args[3], metadata, args[5])
flag <- res[[1]]
if (isTRUE(flag)) {
  cat("\nSCDHA_FLAG=TRUE\n")
} else {
  cat("\nSCDHA_FLAG=", paste(format(flag), collapse = " "), "\n", sep = "")
}"#;

/// Keep at most this many bytes of stderr in error reports
const STDERR_LIMIT: usize = 2048;

/// Backend that shells out to `Rscript`
#[derive(Debug, Clone)]
pub struct RscriptBackend {
    rscript: String,
    script: PathBuf,
    function: String,
    workdir: PathBuf,
}

impl RscriptBackend {
    pub fn new(
        rscript: impl Into<String>,
        script: impl Into<PathBuf>,
        function: impl Into<String>,
        workdir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            rscript: rscript.into(),
            script: script.into(),
            function: function.into(),
            workdir: workdir.into(),
        }
    }

    pub fn from_config(config: &AnalysisConfig, workdir: impl Into<PathBuf>) -> Self {
        Self::new(
            config.rscript.clone(),
            config.script.clone(),
            config.function.clone(),
            workdir,
        )
    }

    fn command(&self, job: &AnalysisJob) -> Command {
        let metadata = job
            .metadata
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut cmd = Command::new(&self.rscript);
        cmd.arg("-e")
            .arg(DRIVER)
            .arg(&self.script)
            .arg(&self.function)
            .arg(&job.matrix)
            .arg(metadata)
            .arg(job.prefix.as_str())
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl AnalysisBackend for RscriptBackend {
    fn name(&self) -> &str {
        "rscript"
    }

    async fn run(&self, job: &AnalysisJob) -> Result<ArtifactSet, AnalysisError> {
        debug!(
            prefix = %job.prefix,
            matrix = %job.matrix.display(),
            metadata = ?job.metadata,
            "Spawning {}",
            self.rscript
        );

        let output = self
            .command(job)
            .output()
            .await
            .map_err(AnalysisError::Spawn)?;

        if !output.status.success() {
            return Err(AnalysisError::Failed {
                status: output.status.to_string(),
                stderr: tail(&String::from_utf8_lossy(&output.stderr), STDERR_LIMIT),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        match parse_flag(&stdout) {
            Some(Value::Bool(true)) => Ok(ArtifactSet::for_prefix(&job.prefix)),
            Some(flag) => Err(AnalysisError::Rejected(flag)),
            None => Err(AnalysisError::Protocol(tail(&stdout, STDERR_LIMIT))),
        }
    }
}

/// Extract the result flag from driver output (last marker line wins)
pub fn parse_flag(stdout: &str) -> Option<Value> {
    let raw = stdout
        .lines()
        .rev()
        .find_map(|line| line.trim_end().strip_prefix(FLAG_MARKER))?
        .trim();

    Some(match raw {
        "TRUE" => Value::Bool(true),
        "FALSE" => Value::Bool(false),
        "NA" | "NULL" | "" => Value::Null,
        other => Value::String(other.to_string()),
    })
}

fn tail(text: &str, limit: usize) -> String {
    let text = text.trim();
    if text.len() <= limit {
        return text.to_string();
    }
    let mut start = text.len() - limit;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &text[start..])
}
