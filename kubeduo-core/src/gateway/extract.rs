//! Substring extraction for query-mode commands
//!
//! Formats pinned against the collaborators' documented output:
//!   `kubeadm token create --print-join-command`
//!     -> "kubeadm join <host>:<port> --token <6>.<16> --discovery-token-ca-cert-hash sha256:<64 hex>"
//!   bootstrap tokens -> `[a-z0-9]{6}\.[a-z0-9]{16}`

use once_cell::sync::Lazy;
use regex::Regex;
use std::net::Ipv4Addr;

static JOIN_COMMAND: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"kubeadm join\s+[A-Za-z0-9.\-\[\]:]+:\d+[\s\\]+--token\s+[a-z0-9]{6}\.[a-z0-9]{16}[\s\\]+--discovery-token-ca-cert-hash\s+sha256:[a-f0-9]{64}",
    )
    .expect("join command pattern is valid")
});

static BOOTSTRAP_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[a-z0-9]{6}\.[a-z0-9]{16}\b").expect("token pattern is valid")
});

static IPV4: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").expect("ipv4 pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extractor {
    /// Full `kubeadm join ...` command line.
    JoinCommand,
    /// A bare bootstrap token.
    BootstrapToken,
    /// First valid dotted-quad address.
    Ipv4,
    /// Entire output, trimmed. Empty output extracts nothing.
    Whole,
}

impl Extractor {
    /// Return exactly the substring matching the format, or `None`.
    pub fn extract(self, output: &str) -> Option<String> {
        match self {
            Extractor::JoinCommand => JOIN_COMMAND.find(output).map(|m| m.as_str().to_string()),
            Extractor::BootstrapToken => {
                BOOTSTRAP_TOKEN.find(output).map(|m| m.as_str().to_string())
            }
            Extractor::Ipv4 => IPV4
                .find_iter(output)
                .find(|m| m.as_str().parse::<Ipv4Addr>().is_ok())
                .map(|m| m.as_str().to_string()),
            Extractor::Whole => {
                let trimmed = output.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
        }
    }

    pub fn format(self) -> &'static str {
        match self {
            Extractor::JoinCommand => "kubeadm join command",
            Extractor::BootstrapToken => "bootstrap token",
            Extractor::Ipv4 => "IPv4 address",
            Extractor::Whole => "non-empty output",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "sha256:0f4b6d3e9a1c2b7d8e5f60718293a4b5c6d7e8f90a1b2c3d4e5f60718293a4b5";

    #[test]
    fn test_extract_join_command() {
        let output = format!(
            "W1016 warning: something\nkubeadm join 10.12.0.5:6443 --token abcdef.0123456789abcdef --discovery-token-ca-cert-hash {HASH} \n"
        );
        assert_eq!(
            Extractor::JoinCommand.extract(&output).as_deref(),
            Some(
                format!(
                    "kubeadm join 10.12.0.5:6443 --token abcdef.0123456789abcdef --discovery-token-ca-cert-hash {HASH}"
                )
                .as_str()
            )
        );
    }

    #[test]
    fn test_extract_join_command_from_init_output() {
        let output = format!(
            "Then you can join any number of worker nodes by running:\n\nkubeadm join 10.12.0.5:6443 --token abcdef.0123456789abcdef \\\n\t--discovery-token-ca-cert-hash {HASH}\n"
        );
        let extracted = Extractor::JoinCommand.extract(&output).unwrap();
        assert!(extracted.starts_with("kubeadm join 10.12.0.5:6443"));
        assert!(extracted.ends_with(HASH));
    }

    #[test]
    fn test_join_command_rejects_malformed_token() {
        let output = format!(
            "kubeadm join 10.12.0.5:6443 --token ABC.short --discovery-token-ca-cert-hash {HASH}"
        );
        assert_eq!(Extractor::JoinCommand.extract(&output), None);
    }

    #[test]
    fn test_extract_token() {
        assert_eq!(
            Extractor::BootstrapToken
                .extract("TOKEN  TTL\nabcdef.0123456789abcdef   23h")
                .as_deref(),
            Some("abcdef.0123456789abcdef")
        );
    }

    #[test]
    fn test_extract_ipv4_skips_invalid() {
        assert_eq!(
            Extractor::Ipv4.extract("999.1.1.1 then 192.168.64.3").as_deref(),
            Some("192.168.64.3")
        );
    }

    #[test]
    fn test_whole_rejects_empty() {
        assert_eq!(Extractor::Whole.extract("  \n"), None);
        assert_eq!(Extractor::Whole.extract(" x \n").as_deref(), Some("x"));
    }
}
