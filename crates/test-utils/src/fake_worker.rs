use std::path::Path;

use cosi::jobs::WorkerLauncher;

/// Launcher running the real `cosi worker <service>` entry point of `binary`.
///
/// Integration tests pass `env!("CARGO_BIN_EXE_cosi")`.
pub fn cosi_launcher(binary: impl AsRef<Path>) -> WorkerLauncher {
    WorkerLauncher::new(binary.as_ref())
}

/// Launcher running a shell script instead of a real worker.
///
/// The script is started as `sh -c <script> worker <service>`, so `$0` is
/// `worker` and `$1` the service name. The request arrives on stdin, the
/// result goes to stdout, log lines to stderr.
pub fn script_launcher(script: &str) -> WorkerLauncher {
    WorkerLauncher::new("sh").with_args(["-c", script])
}
