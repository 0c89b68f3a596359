//! The external prober boundary.
//!
//! The prober is an opaque batch scanner: it reads a hex-line target file,
//! pings every address, and writes the responding subset as another
//! hex-line file. Everything else about it (rate limits, retries, raw
//! sockets) is its own business.

use std::net::Ipv6Addr;
use std::path::Path;
use std::process::Command;

use sixhound_addr::{read_hex_file, write_hex_file};

use crate::ScanError;

/// Placeholder in prober argument templates replaced by the target file.
const INPUT_PLACEHOLDER: &str = "{input}";

/// Placeholder in prober argument templates replaced by the results file.
const OUTPUT_PLACEHOLDER: &str = "{output}";

/// A batch ICMP prober.
///
/// Implementations must write responding addresses to `results` in
/// hex-line format and return how many responded.
pub trait Prober {
    fn scan(&self, targets: &Path, results: &Path) -> Result<usize, ScanError>;
}

/// Runs an external scanner binary synchronously.
///
/// The argument template is substituted per invocation: `{input}` becomes
/// the target file path and `{output}` the results file path. The child's
/// stderr is inherited so scanner diagnostics reach the operator.
pub struct CommandProber {
    program: String,
    args: Vec<String>,
}

impl CommandProber {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl Prober for CommandProber {
    fn scan(&self, targets: &Path, results: &Path) -> Result<usize, ScanError> {
        let args: Vec<String> = self
            .args
            .iter()
            .map(|arg| {
                arg.replace(INPUT_PLACEHOLDER, &targets.to_string_lossy())
                    .replace(OUTPUT_PLACEHOLDER, &results.to_string_lossy())
            })
            .collect();
        tracing::debug!(
            program = %self.program,
            targets = %targets.display(),
            results = %results.display(),
            "invoking prober"
        );
        let status = Command::new(&self.program)
            .args(&args)
            .status()
            .map_err(|e| ScanError::ProbeFailed {
                reason: format!("failed to spawn '{}': {e}", self.program),
            })?;
        if !status.success() {
            return Err(ScanError::ProbeFailed {
                reason: format!("'{}' exited with {status}", self.program),
            });
        }
        let responded = read_hex_file(results)?;
        tracing::debug!(responded = responded.len(), "prober finished");
        Ok(responded.len())
    }
}

/// A prober whose responses are computed by a function over the target
/// list. Used by tests and dry runs in place of a real scanner.
pub struct ScriptedProber<F>
where
    F: Fn(&[Ipv6Addr]) -> Vec<Ipv6Addr>,
{
    respond: F,
}

impl<F> ScriptedProber<F>
where
    F: Fn(&[Ipv6Addr]) -> Vec<Ipv6Addr>,
{
    pub fn new(respond: F) -> Self {
        Self { respond }
    }
}

impl<F> Prober for ScriptedProber<F>
where
    F: Fn(&[Ipv6Addr]) -> Vec<Ipv6Addr>,
{
    fn scan(&self, targets: &Path, results: &Path) -> Result<usize, ScanError> {
        let targets = read_hex_file(targets)?;
        let responding = (self.respond)(&targets);
        write_hex_file(results, &responding)?;
        Ok(responding.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn command_prober_substitutes_paths_and_counts_lines() {
        let dir = tempdir().unwrap();
        let targets = dir.path().join("targets");
        let results = dir.path().join("results");
        write_hex_file(&targets, &["2001:db8::1".parse().unwrap(), "::1".parse().unwrap()])
            .unwrap();

        // `cp` stands in for a scanner that reports every target alive.
        let prober = CommandProber::new("cp", vec!["{input}".into(), "{output}".into()]);
        let count = prober.scan(&targets, &results).unwrap();
        assert_eq!(count, 2);
        assert_eq!(read_hex_file(&results).unwrap().len(), 2);
    }

    #[test]
    fn command_prober_surfaces_nonzero_exit() {
        let dir = tempdir().unwrap();
        let prober = CommandProber::new("false", vec![]);
        let err = prober
            .scan(&dir.path().join("in"), &dir.path().join("out"))
            .unwrap_err();
        assert!(matches!(err, ScanError::ProbeFailed { .. }));
    }

    #[test]
    fn command_prober_surfaces_spawn_failure() {
        let dir = tempdir().unwrap();
        let prober = CommandProber::new("/nonexistent/scanner", vec![]);
        let err = prober
            .scan(&dir.path().join("in"), &dir.path().join("out"))
            .unwrap_err();
        assert!(matches!(err, ScanError::ProbeFailed { .. }));
    }

    #[test]
    fn scripted_prober_round_trips() {
        let dir = tempdir().unwrap();
        let targets = dir.path().join("targets");
        let results = dir.path().join("results");
        let a: Ipv6Addr = "2001:db8::1".parse().unwrap();
        let b: Ipv6Addr = "2001:db8::2".parse().unwrap();
        write_hex_file(&targets, &[a, b]).unwrap();

        let prober = ScriptedProber::new(|targets: &[Ipv6Addr]| {
            targets.iter().copied().filter(|t| *t == "2001:db8::1".parse::<Ipv6Addr>().unwrap()).collect()
        });
        assert_eq!(prober.scan(&targets, &results).unwrap(), 1);
        assert_eq!(read_hex_file(&results).unwrap(), vec![a]);
    }
}
