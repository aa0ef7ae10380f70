//! Instance user data.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use crate::descriptor::OsFamily;

/// Base64-encoded user data for `os_type`, or `None` when the OS family is
/// not recognized.
pub fn for_host(os_type: &str, user: &str, password: &str) -> Option<String> {
    match OsFamily::parse(os_type)? {
        OsFamily::Linux => Some(BASE64.encode(linux_cloud_config(user, password))),
    }
}

/// `#cloud-config` that creates `user` with sudo rights and enables
/// password SSH login.
pub fn linux_cloud_config(user: &str, password: &str) -> String {
    // JSON strings are valid YAML double-quoted scalars.
    let user = quote(user);
    let password = quote(password);
    format!(
        "#cloud-config\n\
         ssh_pwauth: true\n\
         chpasswd:\n  expire: false\n\
         users:\n  - default\n  - name: {user}\n    \
         plain_text_passwd: {password}\n    \
         lock_passwd: false\n    \
         shell: /bin/bash\n    \
         sudo: \"ALL=(ALL) NOPASSWD:ALL\"\n"
    )
}

fn quote(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linux_cloud_config_contents() {
        let doc = linux_cloud_config("ubuntu", "s3cret");
        assert!(doc.starts_with("#cloud-config\n"));
        assert!(doc.contains("  - name: \"ubuntu\"\n"));
        assert!(doc.contains("    plain_text_passwd: \"s3cret\"\n"));
        assert!(doc.contains("    lock_passwd: false\n"));
        assert!(doc.contains("ssh_pwauth: true\n"));
        assert!(doc.contains("sudo: \"ALL=(ALL) NOPASSWD:ALL\""));
    }

    #[test]
    fn test_values_are_quoted() {
        let doc = linux_cloud_config("ops", "pa\"ss: #1");
        assert!(doc.contains(r#"plain_text_passwd: "pa\"ss: #1""#), "{}", doc);
    }

    #[test]
    fn test_for_host_encodes_linux_user_data() {
        let encoded = for_host("Linux", "ubuntu", "pw").unwrap();
        let decoded = String::from_utf8(BASE64.decode(encoded).unwrap()).unwrap();
        assert_eq!(decoded, linux_cloud_config("ubuntu", "pw"));
    }

    #[test]
    fn test_for_host_unknown_os_has_no_user_data() {
        assert!(for_host("windows", "admin", "pw").is_none());
        assert!(for_host("", "admin", "pw").is_none());
    }
}
