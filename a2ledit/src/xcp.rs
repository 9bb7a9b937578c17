use crate::A2lDocument;
use std::fmt::Display;

/// Settings found in the XCP `IF_DATA` blocks of a document
///
/// Each entry of `blocks` holds the `KEY value` pairs of one `IF_DATA` block, in the order of their first appearance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XcpInfo {
    pub blocks: Vec<Vec<(String, String)>>,
}

impl Display for XcpInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("XCP IF_DATA: ")?;
        for (idx, block) in self.blocks.iter().enumerate() {
            if idx > 0 {
                f.write_str(" | ")?;
            }
            for (pos, (key, value)) in block.iter().enumerate() {
                if pos > 0 {
                    f.write_str("; ")?;
                }
                write!(f, "{key}={value}")?;
            }
        }
        Ok(())
    }
}

pub(crate) fn extract_xcp_info(doc: &A2lDocument) -> Option<XcpInfo> {
    let text = doc.to_text();
    let blocks: Vec<Vec<(String, String)>> = doc
        .scan_blocks(None)
        .iter()
        .filter(|block| block.kind == "IF_DATA")
        .filter(|block| mentions_xcp(block.slice(text)))
        .map(|block| {
            let mut settings: Vec<(String, String)> = Vec::new();
            for line in block.body_slice(text).lines() {
                if let Some((key, value)) = parse_setting(line) {
                    if let Some(existing) = settings.iter_mut().find(|(k, _)| k == key) {
                        existing.1 = value.to_string();
                    } else {
                        settings.push((key.to_string(), value.to_string()));
                    }
                }
            }
            settings
        })
        .filter(|settings| !settings.is_empty())
        .collect();

    if blocks.is_empty() {
        None
    } else {
        Some(XcpInfo { blocks })
    }
}

// mentions_xcp()
// check if the text contains XCP as a separate word (case-insensitive)
fn mentions_xcp(text: &str) -> bool {
    text.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .any(|word| word.eq_ignore_ascii_case("XCP"))
}

// parse_setting()
// match lines of the form `KEY value` or `KEY "value"`; comment lines and block markers are skipped
// Anything after an unquoted value, e.g. a trailing comment, is ignored.
fn parse_setting(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with("/*") || line.starts_with("//") {
        return None;
    }

    let bytes = line.as_bytes();
    if !(bytes[0].is_ascii_alphabetic() || bytes[0] == b'_') {
        return None;
    }
    let key_len = bytes
        .iter()
        .position(|&c| !(c.is_ascii_alphanumeric() || c == b'_' || c == b'.' || c == b'-'))
        .unwrap_or(bytes.len());
    let (key, rest) = line.split_at(key_len);
    let value = rest.trim_start();
    if value.len() == rest.len() || value.is_empty() {
        return None;
    }

    if let Some(quoted) = value.strip_prefix('"') {
        let end = quoted.find('"')?;
        let value = &quoted[..end];
        (!value.is_empty()).then_some((key, value))
    } else if value.starts_with('/') {
        None
    } else {
        // unquoted values are a single token
        let end = value.find(char::is_whitespace).unwrap_or(value.len());
        Some((key, &value[..end]))
    }
}

/*************************************************************************************************/

#[cfg(test)]
mod tests {
    use super::*;

    static XCP_DOC: &str = r#"/begin PROJECT p ""
  /begin MODULE m ""
    /begin IF_DATA XCP
      /* transport layer */
      PROTOCOL_VERSION 0x0104
      TRANSPORT_LAYER "ETH"
      PORT 5555
      /begin DAQ
        DAQ_CONFIG_TYPE DYNAMIC
      /end DAQ
      PORT 5556 /* second port */
    /end IF_DATA
    /begin IF_DATA CANAPE_EXT
      LINK_MAP "x" 0x1000
    /end IF_DATA
    /begin IF_DATA xcp_on_can
      CAN_ID_MASTER 0x7E0
    /end IF_DATA
  /end MODULE
/end PROJECT
"#;

    #[test]
    fn extract_settings() {
        let doc = A2lDocument::from_text(XCP_DOC);
        let info = extract_xcp_info(&doc).unwrap();
        assert_eq!(info.blocks.len(), 1);
        assert_eq!(
            info.blocks[0],
            vec![
                ("PROTOCOL_VERSION".to_string(), "0x0104".to_string()),
                ("TRANSPORT_LAYER".to_string(), "ETH".to_string()),
                ("PORT".to_string(), "5556".to_string()),
                ("DAQ_CONFIG_TYPE".to_string(), "DYNAMIC".to_string()),
            ]
        );
        assert_eq!(
            info.to_string(),
            "XCP IF_DATA: PROTOCOL_VERSION=0x0104; TRANSPORT_LAYER=ETH; PORT=5556; DAQ_CONFIG_TYPE=DYNAMIC"
        );
    }

    #[test]
    fn no_xcp_blocks() {
        let doc = A2lDocument::from_text("/begin IF_DATA CCP\n  STATION 1\n/end IF_DATA\n");
        assert!(extract_xcp_info(&doc).is_none());
        assert!(extract_xcp_info(&A2lDocument::new()).is_none());
    }

    #[test]
    fn display_multiple_blocks() {
        let info = XcpInfo {
            blocks: vec![
                vec![("A".to_string(), "1".to_string())],
                vec![
                    ("B".to_string(), "2".to_string()),
                    ("C".to_string(), "3".to_string()),
                ],
            ],
        };
        assert_eq!(info.to_string(), "XCP IF_DATA: A=1 | B=2; C=3");
    }

    #[test]
    fn setting_lines() {
        assert_eq!(parse_setting("  KEY value"), Some(("KEY", "value")));
        assert_eq!(parse_setting("KEY \"quoted value\""), Some(("KEY", "quoted value")));
        assert_eq!(parse_setting("KEY \"\""), None);
        assert_eq!(parse_setting("KEY"), None);
        assert_eq!(parse_setting("/begin DAQ"), None);
        assert_eq!(parse_setting("/* KEY value */"), None);
        assert_eq!(parse_setting("KEY /end"), None);
        assert_eq!(parse_setting("0x10 0x20"), None);
        // only the first token of an unquoted value is used
        assert_eq!(parse_setting("PORT 5555 /* c */"), Some(("PORT", "5555")));
        assert_eq!(parse_setting("MAX_CTO 8 0xFF"), Some(("MAX_CTO", "8")));
    }
}
