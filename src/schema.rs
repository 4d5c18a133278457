//! The closed set of CERT dataset releases and the numeric-row layout each one
//! fixes. A version is selected once at startup and threaded through every
//! stage; nothing else in the pipeline branches on version strings.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

/// One of the six recognized CERT insider-threat corpus releases.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumString, Display, Serialize, Deserialize,
)]
pub enum SchemaVersion {
    #[strum(serialize = "r4.1")]
    R4_1,
    #[strum(serialize = "r4.2")]
    R4_2,
    #[strum(serialize = "r5.1")]
    R5_1,
    #[strum(serialize = "r5.2")]
    R5_2,
    #[strum(serialize = "r6.1")]
    R6_1,
    #[strum(serialize = "r6.2")]
    R6_2,
}

impl SchemaVersion {
    /// r5/r6 releases carry the extended payloads: device file trees, file
    /// to/from-USB flags and action codes, email send/receive and attachment
    /// details, the LDAP project field.
    pub fn extended(&self) -> bool {
        !matches!(self, SchemaVersion::R4_1 | SchemaVersion::R4_2)
    }

    /// Only r6 logs the http sub-action (visit/download/upload).
    pub fn has_http_action(&self) -> bool {
        matches!(self, SchemaVersion::R6_1 | SchemaVersion::R6_2)
    }

    pub fn device_width(&self) -> usize {
        if self.extended() {
            2
        } else {
            1
        }
    }

    pub fn file_width(&self) -> usize {
        if self.extended() {
            8
        } else {
            5
        }
    }

    pub fn http_width(&self) -> usize {
        if self.has_http_action() {
            6
        } else {
            5
        }
    }

    pub fn email_width(&self) -> usize {
        if self.extended() {
            23
        } else {
            9
        }
    }

    /// Full numeric-row width: the 5 shared columns, the four per-type feature
    /// groups, and the 2 label columns. 27 for r4, 45 for r5, 46 for r6.
    pub fn row_width(&self) -> usize {
        5 + self.device_width()
            + self.file_width()
            + self.http_width()
            + self.email_width()
            + 2
    }

    /// Column names of a numeric activity row, in storage order.
    pub fn numeric_columns(&self) -> Vec<&'static str> {
        let mut cols = vec!["user", "day", "act", "pc", "time", "usb_dur"];
        if self.extended() {
            cols.push("file_tree_len");
        }
        cols.extend(["file_type", "file_len", "file_nwords", "disk", "file_depth"]);
        if self.extended() {
            cols.extend(["file_act", "to_usb", "from_usb"]);
        }
        cols.extend(["http_type", "url_len", "url_depth", "http_c_len", "http_c_nwords"]);
        if self.has_http_action() {
            cols.push("http_act");
        }
        if self.extended() {
            cols.extend(["send_mail", "receive_mail"]);
        }
        cols.extend([
            "n_des",
            "n_atts",
            "Xemail",
            "n_exdes",
            "n_bccdes",
            "exbccmail",
            "email_size",
            "email_text_slen",
            "email_text_nwords",
        ]);
        if self.extended() {
            cols.extend([
                "e_att_other",
                "e_att_comp",
                "e_att_pho",
                "e_att_doc",
                "e_att_txt",
                "e_att_exe",
                "e_att_sother",
                "e_att_scomp",
                "e_att_spho",
                "e_att_sdoc",
                "e_att_stxt",
                "e_att_sexe",
            ]);
        }
        cols.extend(["mal_act", "insider"]);
        cols
    }

    /// Static org attributes attached to every unit row, LDAP order.
    pub fn org_fields(&self) -> Vec<&'static str> {
        let mut f = Vec::new();
        if self.extended() {
            f.push("project");
        }
        f.extend(["role", "b_unit", "f_unit", "dept", "team"]);
        f
    }

    /// Number of weeks the corpus covers; numericization stops here.
    pub fn max_weeks(&self) -> i64 {
        if self.extended() {
            75
        } else {
            73
        }
    }

    /// Dataset tag as it appears in the insiders ground-truth file ("4.2").
    pub fn answer_tag(&self) -> &'static str {
        match self {
            SchemaVersion::R4_1 => "4.1",
            SchemaVersion::R4_2 => "4.2",
            SchemaVersion::R5_1 => "5.1",
            SchemaVersion::R5_2 => "5.2",
            SchemaVersion::R6_1 => "6.1",
            SchemaVersion::R6_2 => "6.2",
        }
    }
}

/// Raw event type, one per source CSV.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumString, Display, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
pub enum ActivityKind {
    Logon,
    Device,
    File,
    Http,
    Email,
}

impl ActivityKind {
    /// Raw CSV layout for this event type under the given release.
    pub fn raw_columns(&self, version: SchemaVersion) -> &'static [&'static str] {
        match self {
            ActivityKind::Logon => &["id", "date", "user", "pc", "activity"],
            ActivityKind::Device => {
                if version.extended() {
                    &["id", "date", "user", "pc", "content", "activity"]
                } else {
                    &["id", "date", "user", "pc", "activity"]
                }
            }
            ActivityKind::File => {
                if version.extended() {
                    &["id", "date", "user", "pc", "url/fname", "activity", "to", "from", "content"]
                } else {
                    &["id", "date", "user", "pc", "url/fname", "content"]
                }
            }
            ActivityKind::Http => {
                if version.has_http_action() {
                    &["id", "date", "user", "pc", "url/fname", "activity", "content"]
                } else {
                    &["id", "date", "user", "pc", "url/fname", "content"]
                }
            }
            ActivityKind::Email => {
                if version.extended() {
                    &["id", "date", "user", "pc", "to", "cc", "bcc", "from", "activity", "size", "att", "content"]
                } else {
                    &["id", "date", "user", "pc", "to", "cc", "bcc", "from", "size", "#att", "content"]
                }
            }
        }
    }

    pub fn csv_name(&self) -> String {
        format!("{self}.csv")
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn declared_widths() {
        assert_eq!(SchemaVersion::R4_2.row_width(), 27);
        assert_eq!(SchemaVersion::R5_2.row_width(), 45);
        assert_eq!(SchemaVersion::R6_2.row_width(), 46);
    }

    #[test]
    fn columns_match_width() {
        for v in SchemaVersion::iter() {
            assert_eq!(v.numeric_columns().len(), v.row_width(), "{v}");
        }
    }

    #[test]
    fn version_tags_round_trip() {
        for v in SchemaVersion::iter() {
            assert_eq!(SchemaVersion::from_str(&v.to_string()).unwrap(), v);
        }
        assert!(SchemaVersion::from_str("r7.0").is_err());
    }

    #[test]
    fn email_layout_differs_by_version() {
        let r4 = ActivityKind::Email.raw_columns(SchemaVersion::R4_2);
        let r5 = ActivityKind::Email.raw_columns(SchemaVersion::R5_2);
        assert!(r4.contains(&"#att") && !r4.contains(&"activity"));
        assert!(r5.contains(&"att") && r5.contains(&"activity"));
    }
}
