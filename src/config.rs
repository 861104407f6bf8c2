//! Rules document model.
//!
//! The rules file is an XML tree:
//!
//! ```xml
//! <rondel>
//!   <ruleset name="promotions" filterTypes="Person,Company" filterStrict="true"
//!            dataKey="D" resultKey="result" workflow="ipl2020" prioritiesCount="all">
//!     <rule name="promote" priority="1">
//!       <r>eq .D.hr.Person.Position "SSE" | .D.hr.Person.SetSalary 50000</r>
//!     </rule>
//!   </ruleset>
//! </rondel>
//! ```
//!
//! A rule's expression is its *raw inner XML*: the template delimiters
//! (`<r>`…`</r>` by default) read as child elements, so the document is
//! walked with the streaming reader and `read_text` captures everything
//! between `<rule>` and `</rule>` verbatim.
//!
//! This module only builds the unmarshalled shape; attribute contracts
//! (required `filterTypes`/`dataKey`, defaults for `resultKey` and
//! `prioritiesCount`) are enforced by the compiler in `engine/parser.rs`.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::QName;

use crate::error::Error;

/// The parsed rules document (root element).
#[derive(Debug, Default)]
pub(crate) struct XmlConfig {
    pub rulesets: Vec<XmlRuleset>,
}

#[derive(Debug, Default)]
pub(crate) struct XmlRuleset {
    pub name: String,
    pub filter_types: String,
    pub filter_strict: bool,
    pub data_key: String,
    pub result_key: String,
    pub priorities_count: String,
    pub workflow: String,
    pub rules: Vec<XmlRule>,
}

#[derive(Debug, Default)]
pub(crate) struct XmlRule {
    pub name: String,
    pub priority: i32,
    pub expr: String,
}

fn attr(start: &BytesStart<'_>, name: &str) -> Result<Option<String>, Error> {
    for a in start.attributes() {
        let a = a.map_err(quick_xml::Error::from)?;
        if a.key.as_ref() == name.as_bytes() {
            return Ok(Some(a.unescape_value().map_err(quick_xml::Error::from)?.into_owned()));
        }
    }
    Ok(None)
}

fn ruleset_from(start: &BytesStart<'_>) -> Result<XmlRuleset, Error> {
    Ok(XmlRuleset {
        name: attr(start, "name")?.unwrap_or_default(),
        filter_types: attr(start, "filterTypes")?.unwrap_or_default(),
        filter_strict: matches!(attr(start, "filterStrict")?.as_deref(), Some("true") | Some("1")),
        data_key: attr(start, "dataKey")?.unwrap_or_default(),
        result_key: attr(start, "resultKey")?.unwrap_or_default(),
        priorities_count: attr(start, "prioritiesCount")?.unwrap_or_default(),
        workflow: attr(start, "workflow")?.unwrap_or_default(),
        rules: Vec::new(),
    })
}

impl XmlConfig {
    pub(crate) fn from_bytes(data: &[u8]) -> Result<XmlConfig, Error> {
        let text = String::from_utf8_lossy(data);
        let mut reader = Reader::from_str(&text);
        reader.config_mut().trim_text(true);

        let mut cfg = XmlConfig::default();
        let mut ruleset: Option<XmlRuleset> = None;

        loop {
            match reader.read_event().map_err(Error::Xml)? {
                Event::Start(start) => match start.name().as_ref() {
                    b"ruleset" => {
                        if ruleset.is_some() {
                            return Err(Error::Malformed("nested ruleset element".to_string()));
                        }
                        ruleset = Some(ruleset_from(&start)?);
                    }
                    b"rule" => {
                        let Some(ruleset) = ruleset.as_mut() else {
                            return Err(Error::Malformed("rule element outside a ruleset".to_string()));
                        };
                        let name = attr(&start, "name")?.unwrap_or_default();
                        let priority = match attr(&start, "priority")? {
                            Some(p) => p
                                .trim()
                                .parse::<i32>()
                                .map_err(|_| Error::Malformed(format!("rule {name:?}: bad priority {p:?}")))?,
                            None => 0,
                        };
                        // Raw inner XML: the expression, template delimiters
                        // included.
                        let tag = start.name().as_ref().to_vec();
                        let expr = reader.read_text(QName(&tag)).map_err(Error::Xml)?.into_owned();
                        ruleset.rules.push(XmlRule { name, priority, expr });
                    }
                    _ => {}
                },
                Event::End(end) => {
                    if end.name().as_ref() == b"ruleset" {
                        if let Some(done) = ruleset.take() {
                            cfg.rulesets.push(done);
                        }
                    }
                }
                Event::Empty(start) => match start.name().as_ref() {
                    b"ruleset" => cfg.rulesets.push(ruleset_from(&start)?),
                    b"rule" => {
                        let Some(ruleset) = ruleset.as_mut() else {
                            return Err(Error::Malformed("rule element outside a ruleset".to_string()));
                        };
                        let name = attr(&start, "name")?.unwrap_or_default();
                        ruleset.rules.push(XmlRule { name, priority: 0, expr: String::new() });
                    }
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
        }

        if ruleset.is_some() {
            return Err(Error::Malformed("unclosed ruleset element".to_string()));
        }
        Ok(cfg)
    }
}
