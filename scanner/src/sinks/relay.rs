use super::FileRelay;
use crate::workflow::config::UploadConfig;
use anyhow::Context;
use log::{info, warn};
use rfspikecore::{SinkError, SinkResult};
use ssh2::Session;
use std::fs;
use std::io::Write;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

/// Copies marker files to a remote host over SCP.
///
/// Every transfer opens a fresh session. Connect and I/O are both bounded,
/// and a failed transfer is retried up to `max_attempts` times in total.
pub struct ScpRelay {
    config: UploadConfig,
    password: String,
}

impl ScpRelay {
    pub fn new(config: UploadConfig, password: String) -> Self {
        Self { config, password }
    }

    /// Reads the password from the environment variable named in the config.
    pub fn from_config(config: &UploadConfig) -> anyhow::Result<Self> {
        let password = std::env::var(&config.password_env).with_context(|| {
            format!(
                "upload password variable {} is not set",
                config.password_env
            )
        })?;
        Ok(Self::new(config.clone(), password))
    }

    fn remote_path(&self, path: &Path) -> SinkResult<String> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| SinkError::Encoding(format!("bad file name {}", path.display())))?;
        let dir = self.config.remote_dir.trim_end_matches('/');
        Ok(if dir.is_empty() {
            file_name.to_string()
        } else {
            format!("{dir}/{file_name}")
        })
    }

    fn connect(&self) -> SinkResult<Session> {
        let endpoint = (self.config.host.as_str(), self.config.port);
        let addr = endpoint
            .to_socket_addrs()
            .map_err(|err| network(format!("resolving {}: {err}", self.config.host)))?
            .next()
            .ok_or_else(|| network(format!("{} has no address", self.config.host)))?;

        let tcp = TcpStream::connect_timeout(&addr, self.config.connect_timeout())?;
        tcp.set_read_timeout(Some(self.config.io_timeout()))?;
        tcp.set_write_timeout(Some(self.config.io_timeout()))?;

        let mut session = Session::new().map_err(ssh_error)?;
        session.set_tcp_stream(tcp);
        session.set_timeout(millis(self.config.io_timeout()));
        session.handshake().map_err(ssh_error)?;
        session
            .userauth_password(&self.config.username, &self.password)
            .map_err(ssh_error)?;
        if !session.authenticated() {
            return Err(network(format!(
                "authentication rejected for {}",
                self.config.username
            )));
        }
        Ok(session)
    }

    fn attempt(&self, path: &Path, contents: &[u8]) -> SinkResult<()> {
        let session = self.connect()?;
        let remote = self.remote_path(path)?;
        let mut channel = session
            .scp_send(Path::new(&remote), 0o644, contents.len() as u64, None)
            .map_err(ssh_error)?;
        channel.write_all(contents)?;
        channel.send_eof().map_err(ssh_error)?;
        channel.wait_eof().map_err(ssh_error)?;
        channel.close().map_err(ssh_error)?;
        channel.wait_close().map_err(ssh_error)?;
        Ok(())
    }
}

impl FileRelay for ScpRelay {
    fn name(&self) -> &str {
        "scp"
    }

    fn transfer(&self, path: &Path) -> SinkResult<()> {
        let contents = fs::read(path)?;
        let attempts = self.config.max_attempts.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            match self.attempt(path, &contents) {
                Ok(()) => {
                    info!(
                        "uploaded {} to {}:{}",
                        path.display(),
                        self.config.host,
                        self.config.remote_dir
                    );
                    return Ok(());
                }
                Err(err) => {
                    warn!(
                        "upload of {} failed (attempt {}/{}): {}",
                        path.display(),
                        attempt,
                        attempts,
                        err
                    );
                    last_error = Some(err);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| network("no upload attempt made".into())))
    }
}

fn network(message: String) -> SinkError {
    SinkError::Network(message)
}

fn ssh_error(err: ssh2::Error) -> SinkError {
    SinkError::Network(err.to_string())
}

fn millis(duration: Duration) -> u32 {
    u32::try_from(duration.as_millis()).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn config(port: u16) -> UploadConfig {
        UploadConfig {
            host: "127.0.0.1".into(),
            port,
            username: "pi".into(),
            remote_dir: "/home/pi/uploads/".into(),
            connect_timeout_secs: 1,
            io_timeout_secs: 1,
            max_attempts: 2,
            ..Default::default()
        }
    }

    #[test]
    fn remote_path_joins_folder_and_name() {
        let relay = ScpRelay::new(config(22), "secret".into());
        assert_eq!(
            relay.remote_path(Path::new("/tmp/detections/rf_event_x.kml")).unwrap(),
            "/home/pi/uploads/rf_event_x.kml"
        );
    }

    #[test]
    fn missing_password_variable_is_reported() {
        let mut upload = config(22);
        upload.password_env = "RFSPIKE_TEST_PASSWORD_NEVER_SET".into();
        let err = ScpRelay::from_config(&upload).err().unwrap();
        assert!(err.to_string().contains("RFSPIKE_TEST_PASSWORD_NEVER_SET"));
    }

    #[test]
    fn unreachable_host_fails_after_all_attempts() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("rf_event.kml");
        fs::write(&file, "<kml/>").unwrap();

        let relay = ScpRelay::new(config(port), "secret".into());
        assert!(relay.transfer(&file).is_err());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let relay = ScpRelay::new(config(22), "secret".into());
        assert!(matches!(
            relay.transfer(Path::new("/nonexistent/rf_event.kml")),
            Err(SinkError::Io(_))
        ));
    }
}
