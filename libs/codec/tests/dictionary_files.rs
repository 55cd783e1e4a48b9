//! Dictionary loading from files and through the dictionary-domain payload

use codec::{
    apply_payload, decode_msg, encode_enum_tables, encode_field_dictionary, encode_msg,
    DataDictionary, DictionaryKind, DictionaryRegistry, Verbosity,
};
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;
use types::{DomainType, Msg, RefreshMsg};

const FIELDS: &str = "\
!tag Version 4.20.29
!tag DictionaryId 1
PROD_PERM  \"PERMISSION\"            1  NULL        INTEGER            5  UINT64           2
PRCTCK_1   \"TICK\"                 14  NULL        ENUMERATED    1 ( 1 )  ENUM             1
BID        \"BID\"                  22  NULL        PRICE             17  REAL64           7
ASK        \"ASK\"                  25  NULL        PRICE             17  REAL64           7
";

const ENUMS: &str = "\
!tag RT_Version 4.20.29
!tag DT_Version 17.91
PRCTCK_1      14
      0      \" \"            no tick
      1      #DE#           up tick
";

fn write_temp(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_registry_loads_and_caches_files() {
    let fields = write_temp(FIELDS);
    let enums = write_temp(ENUMS);
    let registry = DictionaryRegistry::new();

    let first = registry.load_files(fields.path(), enums.path()).unwrap();
    let second = registry.load_files(fields.path(), enums.path()).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(registry.len(), 1);
    assert_eq!(first.field_by_name("ASK").unwrap().fid, 25);
    assert_eq!(first.enum_display(14, 0), Some(" "));
}

#[test]
fn test_dictionary_download_over_the_wire() {
    let fields = write_temp(FIELDS);
    let enums = write_temp(ENUMS);
    let source = DataDictionary::load_files(fields.path(), enums.path()).unwrap();

    let mut downloaded = DataDictionary::new();
    for (name, payload) in [
        ("RWFFld", encode_field_dictionary(&source, Verbosity::Normal).unwrap()),
        ("RWFEnum", encode_enum_tables(&source).unwrap()),
    ] {
        let refresh = RefreshMsg::new()
            .domain(DomainType::DICTIONARY)
            .name(name)
            .payload(payload);
        let bytes = encode_msg(&Msg::from(refresh)).unwrap();
        let decoded = decode_msg(&bytes).unwrap();
        let kind = apply_payload(&mut downloaded, decoded.payload()).unwrap();
        assert_eq!(kind.name(), name);
    }

    assert!(downloaded.is_complete());
    assert_eq!(downloaded.field_count(), source.field_count());
    assert_eq!(downloaded.field(22), source.field(22));
    assert_eq!(downloaded.info().dictionary_id, 1);
    assert_eq!(DictionaryKind::from_name("RWFEnum"), Some(DictionaryKind::EnumTables));
}
