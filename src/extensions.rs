use std::collections::HashMap;

use crate::extensions::ExtensionCategory::*;

/// The six file-type buckets every filename and email attachment falls into.
#[derive(Debug, Eq, PartialEq, Hash, Copy, Clone)]
pub enum ExtensionCategory {
    Others,
    Archives,
    Images,
    Docs,
    Text,
    Exe,
}

impl ExtensionCategory {
    /// Numeric code used in the file_type feature column (other = 1).
    pub fn file_code(&self) -> i64 {
        match self {
            Others => 1,
            Archives => 2,
            Images => 3,
            Docs => 4,
            Text => 5,
            Exe => 6,
        }
    }

    /// Slot in the 6-wide attachment count/size aggregates (other = 0).
    pub fn att_slot(&self) -> usize {
        match self {
            Others => 0,
            Archives => 1,
            Images => 2,
            Docs => 3,
            Text => 4,
            Exe => 5,
        }
    }
}

#[derive(Debug)]
pub struct ExtensionList {
    pub categories: HashMap<ExtensionCategory, Vec<&'static str>>,
}

impl ExtensionList {
    pub fn new() -> ExtensionList {
        let archive = vec!["zip", "rar", "7z"];
        let image = vec!["jpg", "png", "bmp"];
        let doc = vec!["doc", "docx", "pdf"];
        let text = vec!["txt", "cfg", "rtf"];
        let exe = vec!["exe", "sh"];
        let others = vec![];

        let mut categories = HashMap::new();
        categories.insert(Archives, archive);
        categories.insert(Images, image);
        categories.insert(Docs, doc);
        categories.insert(Text, text);
        categories.insert(Exe, exe);
        categories.insert(Others, others);

        ExtensionList { categories }
    }

    pub fn get_extension_category(&self, extension: &str) -> ExtensionCategory {
        let extension_low = &extension.to_lowercase();
        for (k, v) in &self.categories {
            if v.contains(&&**extension_low) {
                return *k;
            }
        }
        Others
    }

    /// file_type code for a filename, from the token after its first dot.
    pub fn file_code_of(&self, fname: &str) -> i64 {
        match fname.split('.').nth(1) {
            Some(ext) => self.get_extension_category(ext).file_code(),
            None => Others.file_code(),
        }
    }
}

impl Default for ExtensionList {
    fn default() -> Self {
        ExtensionList::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_extensions_land_in_their_bucket() {
        let list = ExtensionList::new();
        assert_eq!(list.get_extension_category("ZIP"), Archives);
        assert_eq!(list.get_extension_category("pdf"), Docs);
        assert_eq!(list.get_extension_category("sh"), Exe);
        assert_eq!(list.get_extension_category("xyz"), Others);
    }

    #[test]
    fn file_codes_span_one_to_six() {
        let list = ExtensionList::new();
        assert_eq!(list.file_code_of("notes.txt"), 5);
        assert_eq!(list.file_code_of("backup.zip"), 2);
        assert_eq!(list.file_code_of("holiday.jpg"), 3);
        assert_eq!(list.file_code_of("noextension"), 1);
    }

    #[test]
    fn attachment_slots_cover_all_buckets() {
        let list = ExtensionList::new();
        assert_eq!(list.get_extension_category("doc").att_slot(), 3);
        assert_eq!(list.get_extension_category("exe").att_slot(), 5);
        assert_eq!(list.get_extension_category("xyz").att_slot(), 0);
    }
}
