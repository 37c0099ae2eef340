//! Document store behaviour against files on disk.

use std::fs;
use std::path::PathBuf;

use rstest::{fixture, rstest};
use tempfile::TempDir;
use ut_kvp::{Document, DocumentFormat, KvpStatus, MAX_INCLUDE_DEPTH};

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

#[fixture]
fn workdir() -> TempDir {
    tempfile::tempdir().expect("temp dir")
}

#[rstest]
#[case("test_kvp.yaml")]
#[case("test_kvp.json")]
fn yaml_and_json_files_decode_identically(#[case] name: &str) {
    let document = Document::from_file(fixture_path(name)).expect("fixture loads");

    assert!(document.get_bool("decodeTest/checkBool"));
    assert_eq!(document.get_u8("decodeTest/checkUint8IsDeHex"), 0xde);
    assert_eq!(document.get_u16("decodeTest/checkUint16IsDeadHex"), 0xdead);
    assert_eq!(
        document.get_u32("decodeTest.checkUint32IsDeadBeefHex"),
        0xdead_beef
    );
    assert_eq!(document.list_count("decodeTest/checkUint32List"), 3);
    assert_eq!(document.get_u32("decodeTest/checkUint32List/2"), 1080);
    assert_eq!(
        document
            .get_string("decodeTest/checkStringDeadBeef")
            .expect("string present"),
        "the beef is dead"
    );
    assert!(document.get_bool("platform/features/wifi"));
    assert!(!document.get_bool("platform/features/bluetooth"));
}

#[test]
fn includes_are_merged_and_stripped() {
    let document = Document::from_file(fixture_path("include/main.yaml")).expect("loads");

    assert_eq!(
        document.get_string("device/name").expect("name present"),
        "overridden"
    );
    assert_eq!(
        document.get_string("device/vendor").expect("vendor present"),
        "example"
    );
    assert_eq!(document.get_u32("device/revision"), 7);
    assert_eq!(document.list_count("device/audio/ports"), 2);
    assert_eq!(document.get_u8("device/audio/volume"), 0x40);
    assert!(!document.field_present("device/include"));
    assert!(!document.field_present("device/audio/include"));
}

#[rstest]
fn zero_length_files_fail_to_parse(workdir: TempDir) {
    let path = workdir.path().join("empty.yaml");
    fs::write(&path, b"").expect("write");

    let error = Document::from_file(&path).expect_err("empty file");
    assert_eq!(error.status(), KvpStatus::ParsingError);
}

#[rstest]
fn missing_files_fail_to_open(workdir: TempDir) {
    let mut document = Document::new();
    let error = document
        .open(workdir.path().join("absent.yaml"))
        .expect_err("absent file");
    assert_eq!(error.status(), KvpStatus::FileOpenError);
    assert!(!document.is_open());
}

#[rstest]
fn include_depth_is_bounded(workdir: TempDir) {
    let depth = MAX_INCLUDE_DEPTH + 1;
    for level in 0..=depth {
        let body = if level < depth {
            format!("level{level}: {level}\ninclude: level{}.yaml\n", level + 1)
        } else {
            format!("level{level}: {level}\n")
        };
        fs::write(workdir.path().join(format!("level{level}.yaml")), body).expect("write");
    }

    let error = Document::from_file(workdir.path().join("level0.yaml")).expect_err("too deep");
    assert_eq!(error.status(), KvpStatus::ParsingError);

    let within = Document::from_file(workdir.path().join("level1.yaml")).expect("within limit");
    assert_eq!(within.get_u32(&format!("level{depth}")), u32::try_from(depth).expect("small"));
    assert!(!within.field_present("include"));
}

#[test]
fn emitted_text_reloads_with_identical_fields() {
    let original = Document::from_file(fixture_path("test_kvp.yaml")).expect("loads");

    for format in [DocumentFormat::Yaml, DocumentFormat::Json] {
        let text = original.data_as(format).expect("emits");
        let reloaded = Document::from_bytes(text).expect("reloads");
        for key in [
            "decodeTest/checkUint8IsDeHex",
            "decodeTest/checkUint32List/0",
            "decodeTest/checkStringDeadBeef",
            "decodeTest/checkFloat",
            "decodeTest/checkDoubleScientific",
            "platform/features/wifi",
        ] {
            assert_eq!(
                reloaded.get_string(key).expect("present"),
                original.get_string(key).expect("present"),
                "{format} round trip changed {key}"
            );
        }
    }
}
