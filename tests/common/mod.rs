use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

/// Helper struct to run lightbox commands against an isolated image folder
pub struct LightboxTest {
    pub temp_dir: TempDir,
}

#[allow(dead_code)]
impl LightboxTest {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        LightboxTest { temp_dir }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_lightbox"))
            .args(args)
            .current_dir(self.temp_dir.path())
            .env_remove("LIGHTBOX_CONFIG")
            .env_remove("LIGHTBOX_DEBOUNCE_MS")
            .output()
            .expect("Failed to execute command")
    }

    pub fn run_success(&self, args: &[&str]) -> String {
        let output = self.run(args);
        assert!(
            output.status.success(),
            "Command {:?} failed with stderr: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).to_string()
    }

    pub fn run_failure(&self, args: &[&str]) -> String {
        let output = self.run(args);
        assert!(
            !output.status.success(),
            "Command {:?} should have failed but succeeded",
            args
        );
        String::from_utf8_lossy(&output.stderr).to_string()
    }

    pub fn write_file(&self, name: &str, content: &[u8]) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        fs::write(&path, content).expect("Failed to write file");
        path
    }

    pub fn write_png(&self, name: &str, width: u32, height: u32) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        image::RgbImage::new(width, height)
            .save(&path)
            .expect("Failed to write image");
        path
    }

    pub fn write_config(&self, yaml: &str) {
        self.write_file(".lightbox.yaml", yaml.as_bytes());
    }
}
