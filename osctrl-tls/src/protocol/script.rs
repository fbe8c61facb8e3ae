//! Enroll/remove install-script generation for `GET /{env}/{secretpath}/{script}`
//! and the control-plane `POST /{env}/script/{action}/{platform}` endpoint
//! (spec.md §4.7, §6). Scripts are small shell/PowerShell templates with the
//! environment's enroll secret and the TLS host inlined.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptAction {
    Enroll,
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptPlatform {
    Sh,
    Ps1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptKind {
    pub action: ScriptAction,
    pub platform: ScriptPlatform,
}

impl ScriptKind {
    /// Parses a script filename such as `enroll.sh` or `remove.ps1`.
    pub fn from_filename(name: &str) -> Option<Self> {
        let (action, platform) = match name {
            "enroll.sh" => (ScriptAction::Enroll, ScriptPlatform::Sh),
            "enroll.ps1" => (ScriptAction::Enroll, ScriptPlatform::Ps1),
            "remove.sh" => (ScriptAction::Remove, ScriptPlatform::Sh),
            "remove.ps1" => (ScriptAction::Remove, ScriptPlatform::Ps1),
            _ => return None,
        };
        Some(ScriptKind { action, platform })
    }

    /// Parses the `{action}/{platform}` pair used by the control-plane
    /// script endpoint.
    pub fn from_parts(action: &str, platform: &str) -> Option<Self> {
        let action = match action {
            "enroll" => ScriptAction::Enroll,
            "remove" => ScriptAction::Remove,
            _ => return None,
        };
        let platform = match platform {
            "sh" => ScriptPlatform::Sh,
            "ps1" => ScriptPlatform::Ps1,
            _ => return None,
        };
        Some(ScriptKind { action, platform })
    }
}

/// Renders the install/removal script text for `kind`, inlining `secret` and
/// `tls_host`.
pub fn render(kind: ScriptKind, tls_host: &str, secret: &str) -> String {
    match (kind.action, kind.platform) {
        (ScriptAction::Enroll, ScriptPlatform::Sh) => format!(
            "#!/bin/sh\n\
             set -e\n\
             OSCTRL_TLS_HOST=\"{tls_host}\"\n\
             OSCTRL_ENROLL_SECRET=\"{secret}\"\n\
             osqueryd \\\n\
             \t--enroll_secret_env=OSCTRL_ENROLL_SECRET \\\n\
             \t--tls_hostname=\"$OSCTRL_TLS_HOST\" \\\n\
             \t--tls_enroll_override=/enroll \\\n\
             \t--enroll_tls_endpoint=/enroll\n"
        ),
        (ScriptAction::Enroll, ScriptPlatform::Ps1) => format!(
            "$OsctrlTlsHost = \"{tls_host}\"\n\
             $OsctrlEnrollSecret = \"{secret}\"\n\
             osqueryd.exe `\n\
             \t--enroll_secret_env=OsctrlEnrollSecret `\n\
             \t--tls_hostname=$OsctrlTlsHost `\n\
             \t--enroll_tls_endpoint=/enroll\n"
        ),
        (ScriptAction::Remove, ScriptPlatform::Sh) => format!(
            "#!/bin/sh\n\
             set -e\n\
             # Removes the osquery agent enrolled against {tls_host}.\n\
             systemctl stop osqueryd || true\n\
             systemctl disable osqueryd || true\n\
             rm -rf /var/osquery\n"
        ),
        (ScriptAction::Remove, ScriptPlatform::Ps1) => format!(
            "# Removes the osquery agent enrolled against {tls_host}.\n\
             Stop-Service osqueryd -ErrorAction SilentlyContinue\n\
             sc.exe delete osqueryd\n\
             Remove-Item -Recurse -Force 'C:\\Program Files\\osquery'\n"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_script_filenames() {
        assert_eq!(
            ScriptKind::from_filename("enroll.sh"),
            Some(ScriptKind {
                action: ScriptAction::Enroll,
                platform: ScriptPlatform::Sh
            })
        );
        assert_eq!(ScriptKind::from_filename("enroll.exe"), None);
    }

    #[test]
    fn enroll_script_inlines_secret_and_host() {
        let kind = ScriptKind::from_filename("enroll.sh").unwrap();
        let script = render(kind, "tls.example.com", "S0");
        assert!(script.contains("S0"));
        assert!(script.contains("tls.example.com"));
    }

    #[test]
    fn from_parts_matches_control_plane_segments() {
        assert_eq!(
            ScriptKind::from_parts("remove", "ps1"),
            Some(ScriptKind {
                action: ScriptAction::Remove,
                platform: ScriptPlatform::Ps1
            })
        );
        assert_eq!(ScriptKind::from_parts("bogus", "sh"), None);
    }
}
