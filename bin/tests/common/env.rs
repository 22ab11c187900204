use std::{
    path::Path,
    process::{Child, Command},
};

/// a running `kea-exporter`, killed on drop
pub struct ExporterEnv {
    daemon: Child,
}

impl ExporterEnv {
    pub fn start(listen: &str, config: Option<&Path>, targets: &[String]) -> Self {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_kea-exporter"));
        cmd.arg(format!("--listen={listen}"))
            .arg("--exporter-log=debug")
            .arg("--threads=2")
            .arg("--timeout=1");
        if let Some(config) = config {
            cmd.arg(format!("--config-path={}", config.display()));
        }
        for target in targets {
            cmd.arg(format!("--target={target}"));
        }
        let mut daemon = cmd.spawn().expect("Failed to start kea-exporter");
        std::thread::sleep(std::time::Duration::from_secs(1));
        if let Ok(Some(ret)) = daemon.try_wait() {
            panic!("Failed to start kea-exporter {:?}", ret);
        }
        Self { daemon }
    }
}

impl Drop for ExporterEnv {
    fn drop(&mut self) {
        let _ = self.daemon.kill();
        let _ = self.daemon.wait();
    }
}
