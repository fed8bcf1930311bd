/// Hostname of the server used for TLS and the CredSSP service principal
/// name, with any `:port` suffix stripped.
#[derive(Debug, Clone)]
pub struct ServerName(String);

impl ServerName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(sanitize_server_name(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<String> for ServerName {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&String> for ServerName {
    fn from(value: &String) -> Self {
        Self::new(value.clone())
    }
}

impl From<&str> for ServerName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

fn sanitize_server_name(name: String) -> String {
    match name.rfind(':') {
        Some(idx) if name[idx + 1..].parse::<u16>().is_ok() => name[..idx].to_owned(),
        _ => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_suffix_is_stripped() {
        assert_eq!(ServerName::new("host.example.com:3389").as_str(), "host.example.com");
        assert_eq!(ServerName::new("host.example.com").as_str(), "host.example.com");
    }
}
