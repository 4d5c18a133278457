//! Per-event numeric encoders. Each event type maps to a fixed-width feature
//! group whose width the schema version declares; non-matching groups stay
//! zero-filled so every numeric row keeps the same shape.

use crate::domains::DomainClassifier;
use crate::extensions::ExtensionList;
use crate::ingest::ActivityRecord;
use crate::schema::SchemaVersion;
use crate::timeutil;

const INTERNAL_MAIL_DOMAIN: &str = "dtaa.com";

fn word_count(text: &str) -> i64 {
    text.matches(' ').count() as i64 + 1
}

pub struct EventEncoder {
    version: SchemaVersion,
    extensions: ExtensionList,
    domains: DomainClassifier,
}

impl EventEncoder {
    pub fn new(version: SchemaVersion) -> EventEncoder {
        EventEncoder {
            version,
            extensions: ExtensionList::new(),
            domains: DomainClassifier::new(),
        }
    }

    /// `[file_type, file_len, file_nwords, disk, file_depth]`, extended by
    /// `[file_act, to_usb, from_usb]` on r5/r6.
    pub fn file_features(&self, rec: &ActivityRecord) -> Vec<i64> {
        let file_type = self.extensions.file_code_of(&rec.url_fname);
        let disk = match rec.url_fname.chars().next() {
            Some('C') => 1,
            Some('R') => 2,
            _ => 0,
        };
        let depth = rec.url_fname.matches('\\').count() as i64;
        let mut f = vec![
            file_type,
            rec.content.len() as i64,
            word_count(&rec.content),
            disk,
            depth,
        ];
        if self.version.extended() {
            let file_act = match rec.activity.trim().to_lowercase().as_str() {
                "file open" => 1,
                "file copy" => 2,
                "file write" => 3,
                "file delete" => 4,
                _ => 0,
            };
            f.push(file_act);
            f.push((rec.to == "True") as i64);
            f.push((rec.from == "True") as i64);
        }
        f
    }

    /// 9 features on r4; r5/r6 prepend send/receive flags and append the
    /// per-bucket attachment count and size aggregates (23 total).
    pub fn email_features(&self, rec: &ActivityRecord) -> Vec<i64> {
        let mut recipients: Vec<&str> = rec.to.split(';').filter(|s| !s.is_empty()).collect();
        recipients.extend(rec.cc.split(';').filter(|s| !s.is_empty()));
        let bcc: Vec<&str> = rec.bcc.split(';').filter(|s| !s.is_empty()).collect();

        let n_exdes = recipients
            .iter()
            .chain(&bcc)
            .filter(|a| !a.contains(INTERNAL_MAIL_DOMAIN))
            .count() as i64;
        let n_des = (recipients.len() + bcc.len()) as i64;
        let x_email = (n_exdes > 0) as i64;
        let n_bccdes = bcc.len() as i64;
        let ex_bcc = bcc.iter().any(|a| !a.contains(INTERNAL_MAIL_DOMAIN)) as i64;
        let text_len = rec.content.len() as i64;
        let text_nwords = word_count(&rec.content);

        if !self.version.extended() {
            return vec![
                n_des,
                rec.n_att,
                x_email,
                n_exdes,
                n_bccdes,
                ex_bcc,
                rec.size,
                text_len,
                text_nwords,
            ];
        }

        let send_mail = (rec.activity == "Send") as i64;
        let receive_mail = matches!(rec.activity.as_str(), "Receive" | "View") as i64;
        let mut att_counts = [0i64; 6];
        let mut att_sizes = [0i64; 6];
        let mut n_atts = 0i64;
        for att in rec.att.split(';').filter(|s| !s.is_empty()) {
            n_atts += 1;
            if let Some((ext, size)) = parse_attachment(att) {
                let slot = self.extensions.get_extension_category(ext).att_slot();
                att_counts[slot] += 1;
                att_sizes[slot] += size;
            }
        }

        let mut f = vec![
            send_mail,
            receive_mail,
            n_des,
            n_atts,
            x_email,
            n_exdes,
            n_bccdes,
            ex_bcc,
            rec.size,
            text_len,
            text_nwords,
        ];
        f.extend(att_counts);
        f.extend(att_sizes);
        f
    }

    /// `[http_type, url_len, url_depth, http_c_len, http_c_nwords]`, plus the
    /// visit/download/upload code on r6.
    pub fn http_features(&mut self, rec: &ActivityRecord) -> Vec<i64> {
        let mut f = vec![
            self.domains.classify(&rec.url_fname).code(),
            rec.url_fname.len() as i64,
            rec.url_fname.matches('/').count() as i64 - 2,
            rec.content.len() as i64,
            word_count(&rec.content),
        ];
        if self.version.has_http_action() {
            f.push(match rec.activity.trim().to_lowercase().as_str() {
                "www visit" => 1,
                "www download" => 2,
                "www upload" => 3,
                _ => 0,
            });
        }
        f
    }

    /// Connect duration in seconds, from the first Disconnect on the same PC
    /// in the user's remaining stream. A second Connect on that PC before the
    /// Disconnect, or no Disconnect at all, yields -1. r5/r6 append the USB
    /// file-tree length.
    pub fn device_features(&self, rec: &ActivityRecord, rest: &[ActivityRecord]) -> Vec<i64> {
        let disconnect = rest
            .iter()
            .find(|r| r.pc == rec.pc && r.activity.trim() == "Disconnect");
        let duration = match disconnect {
            Some(dis) => {
                let reconnect = rest
                    .iter()
                    .find(|r| r.pc == rec.pc && r.activity.trim() == "Connect");
                match reconnect {
                    Some(rc) if rc.date < dis.date => -1,
                    _ => timeutil::epoch(dis.date) - timeutil::epoch(rec.date),
                }
            }
            None => -1,
        };
        if self.version.extended() {
            vec![duration, rec.content.split(';').count() as i64]
        } else {
            vec![duration]
        }
    }
}

/// `name.ext(size)`: extension and byte size of one attachment token.
fn parse_attachment(att: &str) -> Option<(&str, i64)> {
    let after_dot = att.split('.').nth(1)?;
    let open = after_dot.find('(')?;
    let close = after_dot.find(')')?;
    let size: i64 = after_dot.get(open + 1..close)?.parse().ok()?;
    Some((&after_dot[..open], size))
}
