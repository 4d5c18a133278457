//! Registrable-domain reduction and the six-way site classifier used by the
//! http encoder. Domains repeat heavily inside a week, so classifications are
//! memoized in an LRU cache.

use std::num::NonZeroUsize;

use lru::LruCache;

const CACHE_CAP: usize = 4096;

/// Domains kept whole instead of collapsed to their last two labels.
const MULTI_LABEL_KEEP: [&str; 4] = ["google.com", ".co.uk", ".co.nz", "live.com"];

const CLOUD_SITES: [&str; 4] = [
    "dropbox.com",
    "drive.google.com",
    "mega.co.nz",
    "account.live.com",
];
const LEAK_SITES: [&str; 3] = ["wikileaks.org", "freedom.press", "theintercept.com"];
const SOCIAL_SITES: [&str; 16] = [
    "facebook.com",
    "twitter.com",
    "plus.google.com",
    "instagr.am",
    "instagram.com",
    "flickr.com",
    "linkedin.com",
    "reddit.com",
    "about.com",
    "youtube.com",
    "pinterest.com",
    "tumblr.com",
    "quora.com",
    "vine.co",
    "match.com",
    "t.co",
];
const JOB_SITES: [&str; 4] = [
    "indeed.com",
    "monster.com",
    "careerbuilder.com",
    "simplyhired.com",
];
const HACK_SITES: [&str; 8] = [
    "webwatchernow.com",
    "actionalert.com",
    "relytec.com",
    "refog.com",
    "wellresearchedreviews.com",
    "softactivity.com",
    "spectorsoft.com",
    "best-spy-soft.com",
];

/// Site family of a visited URL, stored in the http_type column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteCategory {
    Other,
    SocialNetwork,
    CloudStorage,
    JobSite,
    LeakSite,
    Spyware,
}

impl SiteCategory {
    pub fn code(&self) -> i64 {
        match self {
            SiteCategory::Other => 1,
            SiteCategory::SocialNetwork => 2,
            SiteCategory::CloudStorage => 3,
            SiteCategory::JobSite => 4,
            SiteCategory::LeakSite => 5,
            SiteCategory::Spyware => 6,
        }
    }
}

/// Registrable domain of a URL: the host between `//` and the next `/`, with
/// any leading `www.` stripped, collapsed to its last two labels unless it is
/// a known multi-label service.
pub fn registrable_domain(url: &str) -> String {
    let host = match url.find("//") {
        Some(i) => {
            let rest = &url[i + 2..];
            match rest.find('/') {
                Some(j) => &rest[..j],
                None => rest,
            }
        }
        None => url,
    };
    let host = host.strip_prefix("www.").unwrap_or(host);
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() > 2 && !MULTI_LABEL_KEEP.iter().any(|k| host.contains(k)) {
        labels[labels.len() - 2..].join(".")
    } else {
        host.to_string()
    }
}

fn classify_domain(domain: &str, url: &str) -> SiteCategory {
    if CLOUD_SITES.contains(&domain) {
        SiteCategory::CloudStorage
    } else if LEAK_SITES.contains(&domain) {
        SiteCategory::LeakSite
    } else if SOCIAL_SITES.contains(&domain) {
        SiteCategory::SocialNetwork
    } else if JOB_SITES.contains(&domain) {
        SiteCategory::JobSite
    } else if (domain.contains("job") && (domain.contains("hunt") || domain.contains("search")))
        || (domain.contains("aol.com") && (url.contains("recruit") || url.contains("job")))
    {
        SiteCategory::JobSite
    } else if HACK_SITES.contains(&domain) || domain.contains("keylog") {
        SiteCategory::Spyware
    } else {
        SiteCategory::Other
    }
}

pub struct DomainClassifier {
    cache: LruCache<String, SiteCategory>,
}

impl DomainClassifier {
    pub fn new() -> DomainClassifier {
        DomainClassifier {
            cache: LruCache::new(NonZeroUsize::new(CACHE_CAP).unwrap()),
        }
    }

    pub fn classify(&mut self, url: &str) -> SiteCategory {
        let domain = registrable_domain(url);
        // aol.com classification depends on the full URL, not just the domain.
        if domain.contains("aol.com") {
            return classify_domain(&domain, url);
        }
        if let Some(cat) = self.cache.get(&domain) {
            return *cat;
        }
        let cat = classify_domain(&domain, url);
        self.cache.put(domain, cat);
        cat
    }
}

impl Default for DomainClassifier {
    fn default() -> Self {
        DomainClassifier::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_reduction() {
        assert_eq!(
            registrable_domain("http://www.facebook.com/profile/1"),
            "facebook.com"
        );
        assert_eq!(
            registrable_domain("http://news.bbc.co.jp/stories/x"),
            "co.jp"
        );
        assert_eq!(
            registrable_domain("https://drive.google.com/folder/9"),
            "drive.google.com"
        );
        assert_eq!(
            registrable_domain("http://mega.co.nz/dl/abc"),
            "mega.co.nz"
        );
    }

    #[test]
    fn category_membership() {
        let mut c = DomainClassifier::new();
        assert_eq!(
            c.classify("http://dropbox.com/home"),
            SiteCategory::CloudStorage
        );
        assert_eq!(
            c.classify("http://wikileaks.org/leaks/1"),
            SiteCategory::LeakSite
        );
        assert_eq!(
            c.classify("http://www.linkedin.com/in/someone"),
            SiteCategory::SocialNetwork
        );
        assert_eq!(c.classify("http://indeed.com/q/x"), SiteCategory::JobSite);
        assert_eq!(
            c.classify("http://refog.com/download"),
            SiteCategory::Spyware
        );
        assert_eq!(c.classify("http://example.org/a"), SiteCategory::Other);
    }

    #[test]
    fn substring_rules() {
        let mut c = DomainClassifier::new();
        assert_eq!(
            c.classify("http://jobhunters-search.com/x"),
            SiteCategory::JobSite
        );
        // The rule sees the collapsed domain, not subdomains.
        assert_eq!(
            c.classify("http://jobhunt.example.com/x"),
            SiteCategory::Other
        );
        assert_eq!(
            c.classify("http://bestkeylogger.net/x"),
            SiteCategory::Spyware
        );
        // aol only counts as a job site when the URL itself mentions jobs.
        assert_eq!(
            c.classify("http://www.aol.com/jobs/listing"),
            SiteCategory::JobSite
        );
        assert_eq!(c.classify("http://www.aol.com/news/1"), SiteCategory::Other);
    }

    #[test]
    fn cache_returns_same_answer() {
        let mut c = DomainClassifier::new();
        let a = c.classify("http://twitter.com/a");
        let b = c.classify("http://twitter.com/b/c");
        assert_eq!(a, b);
    }
}
