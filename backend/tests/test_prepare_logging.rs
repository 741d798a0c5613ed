//! Config loading and logging installation at node start

use skyfeed_server::prepare;
use std::fs;
use std::io::Write;

#[test]
fn test_prepare_installs_file_logging() {
    let dir = tempfile::tempdir().unwrap();
    let logs = dir.path().join("logs");
    let mut file = tempfile::NamedTempFile::new_in(dir.path()).unwrap();
    write!(
        file,
        "[node]\nproject = \"shop\"\n\n[logging]\nlevel = \"info\"\nformat = \"compact\"\nlog_to_console = false\nlogs_path = \"{}\"\n",
        logs.display()
    )
    .unwrap();

    let config = prepare(file.path()).unwrap();
    assert_eq!(config.node.project, "shop");

    log::info!(target: "skyfeed_server", "node warming up");
    log::debug!(target: "skyfeed_server", "too chatty");

    let written = fs::read_to_string(logs.join("skyfeed.log")).unwrap();
    assert!(written.contains("node warming up"));
    assert!(!written.contains("too chatty"));

    // a second install is refused
    assert!(prepare(file.path()).is_err());
}
