#![allow(dead_code)]

pub mod mocks;

use std::time::Duration;

use xml_record_stream::core::channel::RecordReceiver;

/// Serialization of the `index`-th record of a generated release.
///
/// Records deliberately mix quoting styles, odd spacing, comments, CDATA,
/// entity references, self-closing children and closing tags with trailing
/// whitespace.
pub fn clinvar_set(index: usize) -> String {
    match index % 5 {
        0 => format!(
            "<ClinVarSet ID=\"{index}\">\n    <RecordStatus>current</RecordStatus>\n    <Title>NM_{index}(BRCA1) &amp; more</Title>\n  </ClinVarSet>"
        ),
        1 => format!(
            "<ClinVarSet  ID='{index}'  Status = \"x\" ><!-- note --><Trait><Name><![CDATA[a<b]]></Name></Trait></ClinVarSet>"
        ),
        2 => format!("<ClinVarSet ID=\"{index}\"/>"),
        3 => format!(
            "<ClinVarSet ID=\"{index}\"><Title >spaced</Title  ></ClinVarSet\n  >"
        ),
        _ => format!(
            "<ClinVarSet ID=\"{index}\">\t<ClinVarAssertion><Obs n=\"1\" /><Obs n=\"2\"/>&#169;</ClinVarAssertion>\n</ClinVarSet>"
        ),
    }
}

/// A whole release document holding `count` records, nested under an
/// intermediate element every few records.
pub fn clinvar_release(count: usize) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<ReleaseSet Dated=\"2017-01-01\">\n");
    for index in 0..count {
        if index % 5 == 4 {
            xml.push_str("  <Group><Inner>");
            xml.push_str(&clinvar_set(index));
            xml.push_str("</Inner></Group>\n");
        } else {
            xml.push_str("  ");
            xml.push_str(&clinvar_set(index));
            xml.push('\n');
        }
    }
    xml.push_str("</ReleaseSet>\n");
    xml
}

/// Waits until the channel holds `len` entries.
pub async fn wait_for_len(receiver: &RecordReceiver, len: usize) {
    while receiver.len() != len {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
