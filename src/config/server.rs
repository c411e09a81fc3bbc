// ABOUTME: Target address parsing for the command line.
// ABOUTME: Parses formats like "host", "user@host", "host:port", "user@host:port".

use crate::target::Target;
use crate::types::TargetId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
}

impl ServerAddress {
    pub fn parse(s: &str) -> Result<Self, String> {
        let s = s.trim();
        if s.is_empty() {
            return Err("server address cannot be empty".to_string());
        }

        // Parse format: [user@]host[:port]
        let (user_part, rest) = match s.split_once('@') {
            Some((user, rest)) => {
                if user.is_empty() {
                    return Err("user cannot be empty".to_string());
                }
                (Some(user), rest)
            }
            None => (None, s),
        };

        let (host, port) = if let Some(v6) = rest.strip_prefix('[') {
            let (host, tail) = v6
                .split_once(']')
                .ok_or_else(|| format!("unterminated IPv6 address: {}", rest))?;
            match tail.strip_prefix(':') {
                Some(port) => (host, parse_port(port)?),
                None if tail.is_empty() => (host, 22),
                None => return Err(format!("invalid address: {}", rest)),
            }
        } else if let Some((host, port)) = rest.rsplit_once(':') {
            (host, parse_port(port)?)
        } else {
            (rest, 22)
        };

        if host.is_empty() {
            return Err("hostname cannot be empty".to_string());
        }

        Ok(ServerAddress {
            host: host.to_string(),
            port,
            user: user_part.map(|s| s.to_string()),
        })
    }

    /// A target keyed by its own `host:port`.
    pub fn to_target(&self) -> Target {
        let mut target = Target::new(String::new(), self.host.clone(), self.port);
        target.id = TargetId::new(target.address());
        target
    }
}

fn parse_port(s: &str) -> Result<u16, String> {
    s.parse::<u16>().map_err(|_| format!("invalid port: {}", s))
}
