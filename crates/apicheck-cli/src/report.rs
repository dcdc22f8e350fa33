//! Transcript persistence for `apicheck call --dump`
//!
//! Directory layout: `<dir>/<test>.jsonl`, `<dir>/index.json`, a
//! `<dir>/exchanges.http` file that replays the recorded requests and a
//! `<dir>/config.toml` snapshot of the configuration used.

use std::path::{Path, PathBuf};

use apicheck_core::dump::{TranscriptIndex, write_transcript};
use apicheck_core::{Config, Transcript, to_http_file};

/// Variable name the `.http` file uses for the base URL.
pub const BASE_URL_VAR: &str = "base_url";

pub struct Saved {
    pub index: TranscriptIndex,
    pub http_file: PathBuf,
}

/// Drain `transcript` into `dir` under the test name `test`.
///
/// Sensitive headers are masked in the JSONL files; the `.http` file keeps
/// them so the requests can be replayed.
pub fn save(transcript: &Transcript, test: &str, dir: &Path, base_url: &str, config: &Config) -> anyhow::Result<Saved> {
    let records = transcript.drain_records(test);
    let index = write_transcript(&records, dir, true)?;

    std::fs::write(dir.join("config.toml"), toml::to_string_pretty(&config.masked())?)?;

    let http_file = dir.join("exchanges.http");
    std::fs::write(&http_file, to_http_file(&records, Some(base_url), BASE_URL_VAR))?;

    Ok(Saved { index, http_file })
}
