//! Interrupting a running `terraform apply`
//!
//! Shutdown requests are process-wide, so this lives in its own test binary.
//! The fake apply writes state, then waits to be stopped the way Terraform
//! does on SIGTERM. These tests verify:
//! - The interrupted apply is reported, not hidden behind an exit
//! - State and metadata still reach the asset directory
//! - The next run refuses to provision again

use clustergen::installconfig::{InstallConfig, InstallConfigAsset};
use clustergen::process_guard::{self, ChildRegistry};
use clustergen::types::AwsPlatform;
use clustergen::{
    AssetError, Cluster, METADATA_FILENAME, STATE_FILE_NAME, Store, Terraform, ToolArgs,
    run_tool_safe,
};
use nix::libc::SIGINT;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::{Duration, Instant};

const INTERRUPTIBLE_TERRAFORM: &str = r#"#!/bin/bash
case "$1" in
  init)
    exit 0
    ;;
  apply)
    trap 'echo "Interrupt received, stopping" >&2; exit 130' TERM
    echo '{"version":4,"serial":2,"resources":["aws_instance.master"]}' > terraform.tfstate
    touch "$(dirname "$0")/apply-started"
    sleep 60 &
    wait
    ;;
esac
"#;

struct Echo<'a> {
    dir: &'a Path,
}

impl ToolArgs for Echo<'_> {
    fn program(&self) -> &Path {
        Path::new("echo")
    }
    fn to_cli_args(&self) -> Vec<String> {
        vec!["never printed".to_string()]
    }
    fn working_dir(&self) -> &Path {
        self.dir
    }
}

#[test]
fn test_interrupted_apply_persists_state_and_metadata() {
    let tool_dir = tempfile::tempdir().expect("tempdir");
    let terraform = tool_dir.path().join("terraform");
    std::fs::write(&terraform, INTERRUPTIBLE_TERRAFORM).expect("write fake terraform");
    std::fs::set_permissions(&terraform, std::fs::Permissions::from_mode(0o755))
        .expect("chmod fake terraform");
    let started = tool_dir.path().join("apply-started");

    // Stands in for the signal handler thread
    let interrupter = std::thread::spawn(move || {
        let deadline = Instant::now() + Duration::from_secs(30);
        while !started.exists() {
            assert!(Instant::now() < deadline, "apply never started");
            std::thread::sleep(Duration::from_millis(20));
        }
        process_guard::interrupt(SIGINT);
    });

    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = InstallConfig::new("demo", "example.com");
    config.platform.aws = Some(AwsPlatform {
        region: "us-test-1".to_string(),
        master_instance_type: None,
    });
    let cluster_id = config.cluster_id.clone();
    let mut store = Store::new(dir.path());
    store.provide(InstallConfigAsset::from_config(config));
    store.provide(Cluster::with_provisioner(Terraform::new(&terraform)));

    let err = store.fetch_default::<Cluster>().unwrap_err();
    interrupter.join().expect("interrupter thread");

    assert!(matches!(
        err.root(),
        AssetError::Interrupted { signal: "SIGINT" }
    ));
    assert!(err.to_string().contains("failed to run terraform"));
    assert_eq!(process_guard::shutdown_requested(), Some(SIGINT));
    assert_eq!(ChildRegistry::with_global(|registry| registry.count()), 0);

    let state = std::fs::read_to_string(dir.path().join(STATE_FILE_NAME)).expect("state");
    assert!(state.contains("aws_instance.master"));
    let metadata: serde_json::Value =
        serde_json::from_slice(&std::fs::read(dir.path().join(METADATA_FILENAME)).expect("read"))
            .expect("json");
    assert_eq!(
        metadata,
        serde_json::json!({
            "clusterName": "demo",
            "aws": {
                "region": "us-test-1",
                "identifier": { "tectonicClusterID": cluster_id }
            }
        })
    );

    // No new tool starts once shutdown was requested
    let err = run_tool_safe(&Echo { dir: dir.path() }).unwrap_err();
    assert!(matches!(err, AssetError::Interrupted { signal: "SIGINT" }));

    // A later run finds the state and refuses to launch again
    let mut store = Store::new(dir.path());
    store.provide(Cluster::with_provisioner(Terraform::new(&terraform)));
    let err = store.fetch_default::<Cluster>().unwrap_err();
    assert!(err.is_already_exists());
}
