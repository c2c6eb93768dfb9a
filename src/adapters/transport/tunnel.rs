use crate::adapters::transport::TransportError;
use crate::adapters::transport::rest::{ExchangeRequest, ExchangeResponse, HttpExchange};
use crate::config::{ConfigError, TunnelConfig};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Marker curl appends after the body so the HTTP status can be split off stdout.
const STATUS_MARKER: &str = "\n__SMSGW_HTTP_STATUS__:";

/// Issues REST calls by running `curl` on a remote host over `ssh`.
///
/// The request body travels on stdin and is never part of the remote command line.
#[derive(Debug, Clone)]
pub struct SshCurlExchange {
    ssh_binary: String,
    ssh_args: Vec<String>,
}

impl SshCurlExchange {
    /// # Errors
    /// Returns `ConfigError::Missing` if no tunnel host is configured.
    pub fn new(tunnel: &TunnelConfig) -> Result<Self, ConfigError> {
        let host = tunnel.host.as_deref().ok_or(ConfigError::Missing("tunnel-host"))?;
        let destination = match tunnel.user.as_deref() {
            Some(user) => format!("{user}@{host}"),
            None => host.to_string(),
        };

        let mut ssh_args =
            vec!["-o".to_string(), "BatchMode=yes".to_string(), "-p".to_string(), tunnel.port.to_string()];
        if let Some(identity) = &tunnel.identity_file {
            ssh_args.push("-i".to_string());
            ssh_args.push(identity.clone());
        }
        ssh_args.push(destination);

        Ok(Self { ssh_binary: tunnel.ssh_binary.clone(), ssh_args })
    }
}

/// Quotes `value` for a POSIX shell.
pub(crate) fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// The command line the remote shell runs for `request`.
pub(crate) fn remote_command(request: &ExchangeRequest) -> String {
    let mut args = vec![
        "curl".to_string(),
        "-sS".to_string(),
        "-X".to_string(),
        request.method.as_str().to_string(),
        "-H".to_string(),
        shell_quote(&format!("Authorization: Bearer {}", request.bearer_token)),
        "-H".to_string(),
        shell_quote(&format!("Content-Type: {}", request.content_type)),
        "-w".to_string(),
        shell_quote(&format!("{STATUS_MARKER}%{{http_code}}")),
    ];
    if request.body.is_some() {
        args.push("--data-binary".to_string());
        args.push("@-".to_string());
    }
    args.push(shell_quote(&request.url));
    args.join(" ")
}

/// Splits curl's stdout into the response body and the trailing HTTP status.
fn split_status(stdout: &str) -> Result<ExchangeResponse, TransportError> {
    let (body, status) = stdout
        .rsplit_once(STATUS_MARKER)
        .ok_or_else(|| TransportError::Tunnel("curl output carried no HTTP status".into()))?;
    let status = status
        .trim()
        .parse::<u16>()
        .map_err(|_| TransportError::Tunnel(format!("unreadable HTTP status {:?}", status.trim())))?;
    if status == 0 {
        return Err(TransportError::Tunnel("remote curl could not reach the backend".into()));
    }
    Ok(ExchangeResponse { status, body: body.to_string() })
}

#[async_trait]
impl HttpExchange for SshCurlExchange {
    #[tracing::instrument(level = "debug", skip(self, request), fields(url = %request.url))]
    async fn exchange(&self, request: ExchangeRequest) -> Result<ExchangeResponse, TransportError> {
        let mut child = Command::new(&self.ssh_binary)
            .args(&self.ssh_args)
            .arg(remote_command(&request))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TransportError::Tunnel(format!("cannot start {}: {e}", self.ssh_binary)))?;

        if let Some(mut stdin) = child.stdin.take() {
            if let Some(body) = &request.body {
                stdin
                    .write_all(body.as_bytes())
                    .await
                    .map_err(|e| TransportError::Tunnel(format!("writing request body: {e}")))?;
            }
            // Dropping stdin closes it so curl sees EOF
        }

        let output =
            child.wait_with_output().await.map_err(|e| TransportError::Tunnel(format!("waiting for ssh: {e}")))?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TransportError::Tunnel(format!("{} exited with {}: {}", self.ssh_binary, output.status, stderr.trim())));
        }
        split_status(&stdout)
    }
}
