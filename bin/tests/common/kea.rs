//! A stand-in Kea daemon: answers every command on a unix socket with one
//! canned response, then closes the connection like Kea does.
use std::{
    io::{Read, Write},
    os::unix::net::UnixListener,
    path::{Path, PathBuf},
    thread,
};

pub struct FakeKea {
    path: PathBuf,
}

impl FakeKea {
    pub fn start<P: AsRef<Path>>(path: P, response: &'static str) -> Self {
        let path = path.as_ref().to_path_buf();
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path).expect("failed to bind fake kea socket");
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf);
                let _ = stream.write_all(response.as_bytes());
            }
        });
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FakeKea {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
