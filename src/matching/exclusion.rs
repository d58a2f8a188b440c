// src/matching/exclusion.rs - Sect exclusion and category rules
//
// The rules are plain data: a denomination table, one keyword table per
// excluded sect and an ordered category table. `RuleTable::classify` walks
// them; nothing else in the crate knows the keywords.

use once_cell::sync::Lazy;
use serde::Serialize;

use crate::models::{CandidateRecord, Category};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Sect {
    Shia,
    Ahmadiyya,
}

impl Sect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sect::Shia => "shia",
            Sect::Ahmadiyya => "ahmadiyya",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExclusionReason {
    Denomination { sect: Sect, tag: String },
    SectKeyword { sect: Sect, keyword: &'static str },
    MultiFaith,
}

impl ExclusionReason {
    /// Key used for the per-reason counters in the run summary.
    pub fn label(&self) -> String {
        match self {
            ExclusionReason::Denomination { sect, .. } => format!("{}_denomination", sect.as_str()),
            ExclusionReason::SectKeyword { sect, .. } => format!("{}_keyword", sect.as_str()),
            ExclusionReason::MultiFaith => "multi_faith".to_string(),
        }
    }
}

impl std::fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExclusionReason::Denomination { sect, tag } => {
                write!(f, "{} denomination tag '{}'", sect.as_str(), tag)
            }
            ExclusionReason::SectKeyword { sect, keyword } => {
                write!(f, "{} keyword '{}'", sect.as_str(), keyword)
            }
            ExclusionReason::MultiFaith => f.write_str("multi-faith venue"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub excluded: bool,
    pub reason: Option<ExclusionReason>,
    pub category: Category,
}

impl Classification {
    fn excluded(reason: ExclusionReason) -> Self {
        Self {
            excluded: true,
            reason: Some(reason),
            category: Category::Mosque,
        }
    }

    fn kept(category: Category) -> Self {
        Self {
            excluded: false,
            reason: None,
            category,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DenominationRule {
    pub tag: &'static str,
    pub sect: Sect,
}

#[derive(Debug, Clone, Copy)]
pub struct SectKeywordRule {
    pub keyword: &'static str,
    pub sect: Sect,
}

/// Name keyword -> category, skipped when the name also contains any of
/// `unless_name_contains`.
#[derive(Debug, Clone, Copy)]
pub struct CategoryRule {
    pub keyword: &'static str,
    pub category: Category,
    pub unless_name_contains: &'static [&'static str],
}

const EXCLUDED_DENOMINATIONS: [DenominationRule; 4] = [
    DenominationRule { tag: "shia", sect: Sect::Shia },
    DenominationRule { tag: "shi'a", sect: Sect::Shia },
    DenominationRule { tag: "ismaili", sect: Sect::Shia },
    DenominationRule { tag: "ahmadiyya", sect: Sect::Ahmadiyya },
];

const SHIA_KEYWORDS: [&str; 41] = [
    "hussainiya", "husainiya", "husainia", "hussainia",
    "imambargah", "imam bargah", "imam-bargah",
    "ja'fari", "jafari", "jaafari", "jaffria", "jafria",
    "ithna ashari", "ithna-ashari",
    "khoei", "khoie",
    "idara-e-jaaferiya", "jaaferiya", "jaferiya",
    "shia", "shi'a",
    "mehfil-e-abbas", "mehfil e abbas",
    "al-abbas", "hussain foundation",
    "ahlulbayt", "ahlul bayt", "ahl ul bayt",
    "ahl-ul-bayt", "ahl al-bayt",
    "karbala", "kerbala",
    "hyderi", "haideri", "hayderi",
    "rasul al-adham", "rasul-al-adham",
    "zainabia", "zainabiya",
    "imamia", "imamiya",
];

const AHMADIYYA_KEYWORDS: [&str; 24] = [
    "ahmadiyya", "ahmadi muslim",
    "qadiani", "qadiany",
    "baitul futuh", "baitul ehsan", "baitul hamd",
    "baitul aman", "baitul afiyat", "baitul ahad",
    "baitul islam", "baitul noor", "baitul muqeet",
    "baitul ghafoor", "baitul ikram", "baitul huda",
    "nasir mosque", "fazl mosque",
    "ahmadiyya muslim association",
    "tahir mosque",
    "darul barakaat", "darul barakat",
    "noor mosque ahmadiyya",
    "mubarak mosque ahmadiyya",
];

const MOSQUE_WORDS: &[&str] = &["mosque", "masjid"];

const CATEGORY_RULES: [CategoryRule; 13] = [
    CategoryRule { keyword: "prayer room", category: Category::PrayerRoom, unless_name_contains: &[] },
    CategoryRule { keyword: "prayer hall", category: Category::PrayerRoom, unless_name_contains: &[] },
    CategoryRule { keyword: "prayer space", category: Category::PrayerRoom, unless_name_contains: &[] },
    CategoryRule { keyword: "musalla", category: Category::PrayerRoom, unless_name_contains: &[] },
    CategoryRule { keyword: "musallah", category: Category::PrayerRoom, unless_name_contains: &[] },
    CategoryRule { keyword: "university mosque", category: Category::PrayerRoom, unless_name_contains: &[] },
    CategoryRule { keyword: "university islamic", category: Category::PrayerRoom, unless_name_contains: &[] },
    CategoryRule { keyword: "university prayer", category: Category::PrayerRoom, unless_name_contains: &[] },
    CategoryRule { keyword: "student prayer", category: Category::PrayerRoom, unless_name_contains: &[] },
    CategoryRule { keyword: "community centre", category: Category::CommunityCentre, unless_name_contains: MOSQUE_WORDS },
    CategoryRule { keyword: "community center", category: Category::CommunityCentre, unless_name_contains: MOSQUE_WORDS },
    CategoryRule { keyword: "community hall", category: Category::CommunityCentre, unless_name_contains: MOSQUE_WORDS },
    CategoryRule { keyword: "islamic mission college", category: Category::CommunityCentre, unless_name_contains: MOSQUE_WORDS },
];

#[derive(Debug, Clone)]
pub struct RuleTable {
    denominations: Vec<DenominationRule>,
    sect_keywords: Vec<SectKeywordRule>,
    categories: Vec<CategoryRule>,
}

static BUILTIN_RULES: Lazy<RuleTable> = Lazy::new(RuleTable::builtin);

impl RuleTable {
    pub fn new(
        denominations: Vec<DenominationRule>,
        sect_keywords: Vec<SectKeywordRule>,
        categories: Vec<CategoryRule>,
    ) -> Self {
        Self {
            denominations,
            sect_keywords,
            categories,
        }
    }

    pub fn builtin() -> Self {
        let sect_keywords = SHIA_KEYWORDS
            .iter()
            .map(|&keyword| SectKeywordRule { keyword, sect: Sect::Shia })
            .chain(
                AHMADIYYA_KEYWORDS
                    .iter()
                    .map(|&keyword| SectKeywordRule { keyword, sect: Sect::Ahmadiyya }),
            )
            .collect();
        Self::new(EXCLUDED_DENOMINATIONS.to_vec(), sect_keywords, CATEGORY_RULES.to_vec())
    }

    pub fn classify(&self, candidate: &CandidateRecord) -> Classification {
        if let Some(reason) = self.exclusion_reason(candidate) {
            return Classification::excluded(reason);
        }
        Classification::kept(self.category_for(candidate))
    }

    fn exclusion_reason(&self, candidate: &CandidateRecord) -> Option<ExclusionReason> {
        let attrs = &candidate.attributes;

        if let Some(denomination) = attrs.denomination.as_deref() {
            let denomination = denomination.to_lowercase();
            if let Some(rule) = self
                .denominations
                .iter()
                .find(|rule| denomination.contains(rule.tag))
            {
                return Some(ExclusionReason::Denomination {
                    sect: rule.sect,
                    tag: denomination,
                });
            }
        }

        let search_text = [
            Some(candidate.record.name.as_str()),
            attrs.alt_name.as_deref(),
            attrs.description.as_deref(),
            attrs.operator.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

        if let Some(rule) = self
            .sect_keywords
            .iter()
            .find(|rule| search_text.contains(rule.keyword))
        {
            return Some(ExclusionReason::SectKeyword {
                sect: rule.sect,
                keyword: rule.keyword,
            });
        }

        if attrs.multi_faith {
            return Some(ExclusionReason::MultiFaith);
        }
        None
    }

    fn category_for(&self, candidate: &CandidateRecord) -> Category {
        if candidate.attributes.jumuah_only {
            return Category::PrayerRoom;
        }
        let name = candidate.record.name.to_lowercase();
        self.categories
            .iter()
            .find(|rule| {
                name.contains(rule.keyword)
                    && !rule.unless_name_contains.iter().any(|w| name.contains(w))
            })
            .map(|rule| rule.category)
            .unwrap_or_default()
    }
}

/// Classify with the built-in rule table.
pub fn classify(candidate: &CandidateRecord) -> Classification {
    BUILTIN_RULES.classify(candidate)
}
