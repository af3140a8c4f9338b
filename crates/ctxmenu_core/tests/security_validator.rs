use ctxmenu_core::security::rules::DANGER_RULES;
use ctxmenu_core::security::{PathProbe, SecurityValidator, ValidationCheck, ValidatorError};
use ctxmenu_core::ValidatorConfig;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Default)]
struct FakeProbe {
    files: HashMap<PathBuf, u64>,
}

impl FakeProbe {
    fn with_file(mut self, path: &str, len: u64) -> Self {
        self.files.insert(PathBuf::from(path), len);
        self
    }
}

impl PathProbe for FakeProbe {
    fn file_len(&self, path: &Path) -> Option<u64> {
        self.files.get(path).copied()
    }
}

fn validator_with(probe: FakeProbe) -> SecurityValidator {
    SecurityValidator::with_probe(ValidatorConfig::default(), Arc::new(probe))
}

fn validator() -> SecurityValidator {
    validator_with(FakeProbe::default())
}

#[test]
fn whitelisted_editor_with_placeholder_is_accepted() {
    let verdict = validator().validate("notepad \"%1\"");
    assert!(verdict.is_accepted(), "{:?}", verdict.reason());
    assert!(verdict.reason().is_none());
}

#[test]
fn format_drive_is_rejected_as_destructive() {
    let verdict = validator().validate("format C: /y");
    assert!(!verdict.is_accepted());
    assert_eq!(verdict.rejected_by, Some(ValidationCheck::Denylist));
    assert_eq!(
        verdict.reason(),
        Some("matches destructive pattern: filesystem format")
    );
}

#[test]
fn unc_executable_is_rejected_as_network_path() {
    let verdict = validator().validate("\\\\evilhost\\share\\tool.exe");
    assert_eq!(verdict.rejected_by, Some(ValidationCheck::NetworkPath));
    assert!(verdict.reason().unwrap().contains("network path"));
}

#[test]
fn network_script_argument_is_rejected() {
    let verdict = validator().validate("cmd /c \\\\evilhost\\share\\payload.bat");
    assert_eq!(verdict.rejected_by, Some(ValidationCheck::NetworkPath));
}

#[test]
fn every_denylist_signature_rejects() {
    let samples: &[(&str, &str)] = &[
        ("cmd /c rd /s /q \"%1\"", "recursive delete"),
        ("rm -rf \"%1\"", "recursive delete"),
        ("powershell Remove-Item \"%1\" -Recurse", "recursive delete"),
        ("cmd /c del /q C:\\", "drive-level delete"),
        ("format C: /y", "filesystem format"),
        ("diskpart", "disk partitioning"),
        ("cipher /w:C:\\", "free-space wipe"),
        ("shutdown /s /t 0", "shutdown/restart"),
        ("reg delete HKCU\\Software\\Foo /f", "registry deletion"),
        (
            "powershell Remove-ItemProperty -Path HKCU:\\Software\\Foo",
            "registry deletion",
        ),
        ("runas /user:Administrator cmd", "privilege escalation shim"),
        ("taskkill /f /im explorer.exe", "forced process termination"),
        ("powershell -EncodedCommand SQBFAFgA", "encoded PowerShell command"),
        (
            "powershell -Command \"Remove-Item C:\\temp\\x\"",
            "PowerShell removal command",
        ),
        ("net user guest /delete", "account deletion"),
        ("wmic shadowcopy delete", "WMI deletion"),
        ("bcdedit /set {default} recoveryenabled No", "boot configuration change"),
        ("vssadmin delete shadows /all /quiet", "shadow copy deletion"),
    ];
    assert_eq!(samples.len(), DANGER_RULES.len());

    let validator = validator();
    for (command, reason) in samples {
        let verdict = validator.validate(command);
        assert_eq!(
            verdict.rejected_by,
            Some(ValidationCheck::Denylist),
            "`{command}` should hit the denylist"
        );
        assert_eq!(
            verdict.reason(),
            Some(format!("matches destructive pattern: {reason}").as_str()),
            "`{command}`"
        );
    }
}

#[test]
fn denylist_matching_ignores_case() {
    let verdict = validator().validate("FORMAT c: /Y");
    assert_eq!(verdict.rejected_by, Some(ValidationCheck::Denylist));
}

#[test]
fn unknown_bare_executable_is_rejected() {
    let verdict = validator().validate("mytool \"%1\"");
    assert_eq!(verdict.rejected_by, Some(ValidationCheck::Untrusted));
    assert_eq!(
        verdict.reason(),
        Some("executable is not in the trusted whitelist: mytool.exe")
    );
}

#[test]
fn missing_absolute_executable_is_rejected() {
    let verdict = validator().validate("\"C:\\Tools\\missing.exe\" \"%1\"");
    assert_eq!(verdict.rejected_by, Some(ValidationCheck::Untrusted));
    assert_eq!(
        verdict.reason(),
        Some("executable not found: C:\\Tools\\missing.exe")
    );
}

#[test]
fn existing_absolute_executable_is_accepted() {
    let validator =
        validator_with(FakeProbe::default().with_file("C:\\Program Files\\App\\app.exe", 4096));
    let verdict = validator.validate("\"C:\\Program Files\\App\\app.exe\" \"%1\"");
    assert!(verdict.is_accepted(), "{:?}", verdict.reason());
}

#[test]
fn executable_on_disk_is_accepted_with_default_probe() {
    let dir = tempfile::tempdir().unwrap();
    let tool = dir.path().join("tool.exe");
    std::fs::write(&tool, b"MZ").unwrap();

    let validator = SecurityValidator::new(ValidatorConfig::default());
    let verdict = validator.validate(&format!("\"{}\" \"%1\"", tool.display()));
    assert!(verdict.is_accepted(), "{:?}", verdict.reason());
}

#[test]
fn trusted_name_in_arbitrary_directory_needs_to_exist() {
    let verdict = validator().validate("C:\\Temp\\notepad.exe \"%1\"");
    assert_eq!(verdict.rejected_by, Some(ValidationCheck::Untrusted));
}

#[test]
fn relative_executable_path_is_rejected() {
    let verdict = validator().validate("tools\\app.exe \"%1\"");
    assert_eq!(verdict.rejected_by, Some(ValidationCheck::Untrusted));
    assert!(verdict.reason().unwrap().contains("relative"));
}

#[test]
fn reserved_device_executable_is_rejected() {
    let verdict = validator().validate("con.exe \"%1\"");
    assert_eq!(verdict.rejected_by, Some(ValidationCheck::ReservedName));
}

#[test]
fn empty_long_and_control_inputs_are_rejected_in_order() {
    let validator = validator();
    assert_eq!(
        validator.validate("   ").rejected_by,
        Some(ValidationCheck::Empty)
    );

    let long = format!("notepad {}", "a".repeat(3000));
    assert_eq!(
        validator.validate(&long).rejected_by,
        Some(ValidationCheck::Length)
    );

    assert_eq!(
        validator.validate("notepad \u{7}\"%1\"").rejected_by,
        Some(ValidationCheck::ControlCharacter)
    );
    assert_eq!(
        validator.validate("notepad \0").rejected_by,
        Some(ValidationCheck::ControlCharacter)
    );
}

#[test]
fn whitelist_is_injected_configuration() {
    let config = ValidatorConfig::default().with_trusted_executables(["mytool.exe"]);
    let validator = SecurityValidator::with_probe(config, Arc::new(FakeProbe::default()));

    assert!(validator.validate("MyTool \"%1\"").is_accepted());
    assert!(!validator.validate("notepad \"%1\"").is_accepted());
}

#[test]
fn validate_bytes_reports_non_utf8_input() {
    let err = validator()
        .validate_bytes(&[b'n', b'o', 0xff, 0xfe])
        .unwrap_err();
    assert_eq!(err, ValidatorError::NotUtf8 { valid_up_to: 2 });

    let verdict = validator().validate_bytes(b"notepad \"%1\"").unwrap();
    assert!(verdict.is_accepted());
}

#[test]
fn validate_name_follows_shape_rules() {
    let validator = validator();
    assert!(validator.validate_name("Open with Code").is_accepted());
    assert!(!validator.validate_name("").is_accepted());
    assert!(!validator.validate_name("a/b").is_accepted());
    assert!(!validator.validate_name("COM1").is_accepted());
    assert!(!validator.validate_name(&"x".repeat(256)).is_accepted());
}

#[test]
fn validate_icon_path_checks_type_size_and_location() {
    let validator = validator_with(
        FakeProbe::default()
            .with_file("C:\\icons\\app.ico", 1024)
            .with_file("C:\\icons\\huge.ico", 11 * 1024 * 1024)
            .with_file("C:\\icons\\app.png", 10),
    );

    assert!(validator.validate_icon_path("").is_accepted());
    assert!(validator.validate_icon_path("C:\\icons\\app.ico").is_accepted());
    assert!(validator.validate_icon_path("C:\\icons\\app.ico,0").is_accepted());
    assert!(!validator.validate_icon_path("C:\\icons\\huge.ico").is_accepted());
    assert!(!validator.validate_icon_path("C:\\icons\\app.png").is_accepted());
    assert!(!validator.validate_icon_path("C:\\icons\\absent.ico").is_accepted());
    assert!(!validator
        .validate_icon_path("\\\\host\\share\\app.ico")
        .is_accepted());
}
