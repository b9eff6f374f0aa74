use once_cell::sync::Lazy;
use regex::{Regex, RegexSet};

/// Results, promotion, market commentary and congratulations.
static CHATTER: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r"(?i)profit.*achieved",
        r"(?i)target.*hit",
        r"(?i)tp.*reached",
        r"(?i)result.*today",
        r"(?i)today.*result",
        r"(?i)\d+\s*pips",
        r"(?i)join.*vip",
        r"(?i)subscribe",
        r"(?i)premium",
        r"(?i)contact.*admin",
        r"(?i)update",
        r"(?i)analysis",
        r"(?i)congratulation",
        r"(?i)congrats",
        r"تم.*الهدف",
        r"حقق.*ربح",
        r"وصل.*الهدف",
        r"نجح.*الصفقة",
        r"نتائج.*اليوم",
        r"اليوم.*ربح",
        r"إجمالي.*الربح",
        r"اشترك",
        r"(?i)انضم.*vip",
        r"للاشتراك",
        r"للتواصل",
        r"تحديث",
        r"تحليل.*السوق",
        r"مبروك",
        r"تهانينا",
    ])
    .expect("literal patterns")
});

static INSTRUMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(GOLD|XAU|XAG|SILVER|BTC|ETH|EUR|GBP|USD|AUD|NZD|CAD|CHF|JPY|OIL|NAS|US30|US100|US500|SPX|GER|UK100)")
        .expect("literal pattern")
});

static DIRECTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(BUY|SELL|LONG|SHORT)\b").expect("literal pattern"));

/// Cheap screen run before parsing: drops chatter and anything without both
/// an instrument and a direction.
pub fn is_useful_message(text: &str) -> bool {
    if !text.chars().any(char::is_alphanumeric) {
        return false;
    }
    if CHATTER.is_match(text) {
        return false;
    }
    INSTRUMENT.is_match(text) && DIRECTION.is_match(text)
}
