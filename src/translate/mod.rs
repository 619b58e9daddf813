//! Translation module
//!
//! Static UI strings per section and language, plus city names. Lookups fall back to English,
//! then to the key itself. `auto` adds machine translation for free text.

pub mod auto;

/// One supported UI language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Language {
    pub code: &'static str,
    pub name: &'static str,
    pub native: &'static str,
}

const LANGUAGES: &[Language] = &[
    Language { code: "en", name: "English", native: "English" },
    Language { code: "hi", name: "Hindi", native: "हिंदी" },
    Language { code: "gu", name: "Gujarati", native: "ગુજરાતી" },
    Language { code: "pa", name: "Punjabi", native: "ਪੰਜਾਬੀ" },
    Language { code: "mr", name: "Marathi", native: "मराठी" },
    Language { code: "ta", name: "Tamil", native: "தமிழ்" },
    Language { code: "te", name: "Telugu", native: "తెలుగు" },
    Language { code: "bn", name: "Bengali", native: "বাংলা" },
];

pub fn available_languages() -> &'static [Language] {
    LANGUAGES
}

pub fn is_supported(code: &str) -> bool {
    LANGUAGES.iter().any(|l| l.code == code)
}

/// "Gujarati (ગુજરાતી)", or the code itself when unknown.
pub fn language_label(code: &str) -> String {
    LANGUAGES
        .iter()
        .find(|l| l.code == code)
        .map(|l| format!("{} ({})", l.name, l.native))
        .unwrap_or_else(|| code.to_string())
}

type Entries = &'static [(&'static str, &'static str)];
type Section = &'static [(&'static str, Entries)];

const MENU: Section = &[
    ("en", &[("dash", "Dashboard"), ("fleet", "Fleet Management"), ("analytics", "Telemetry Logs"), ("routes", "Route Analysis"), ("alerts", "Critical Alerts"), ("settings", "System Settings")]),
    ("hi", &[("dash", "डैशबोर्ड"), ("fleet", "वाहन प्रबंधन"), ("analytics", "टेलीमेट्री लॉग"), ("routes", "मार्ग विश्लेषण"), ("alerts", "गंभीर अलर्ट"), ("settings", "सिस्टम सेटिंग्स")]),
    ("gu", &[("dash", "ડેશબોર્ડ"), ("fleet", "કાફલો સંચાલન"), ("analytics", "ટેલિમેટ્રી લોગ્સ"), ("routes", "રૂટ વિશ્લેષણ"), ("alerts", "ગંભીર ચેતવણીઓ"), ("settings", "સિસ્ટમ સેટિંગ્સ")]),
    ("pa", &[("dash", "ਡੈਸ਼ਬੋਰਡ"), ("fleet", "ਫਲੀਟ ਪ੍ਰਬੰਧਨ"), ("analytics", "ਟੈਲੀਮੈਟਰੀ ਲੌਗਸ"), ("routes", "ਰੂਟ ਵਿਸ਼ਲੇਸ਼ਣ"), ("alerts", "ਨਾਜ਼ੁਕ ਚੇਤਾਵਨੀਆਂ"), ("settings", "ਸਿਸਟਮ ਸੈਟਿੰਗਾਂ")]),
    ("mr", &[("dash", "डॅशबोर्ड"), ("fleet", "फ्लीट व्यवस्थापन"), ("analytics", "टेलीमेट्री लॉग"), ("routes", "मार्ग विश्लेषण"), ("alerts", "गंभीर सूचना"), ("settings", "सिस्टम सेटिंग्ज")]),
    ("bn", &[("dash", "ড্যাশবোর্ড"), ("fleet", "ফ্লিট ম্যানেজমেন্ট"), ("analytics", "টেলিমেট্রি লগ"), ("routes", "রুট বিশ্লেষণ"), ("alerts", "সতর্কতা"), ("settings", "সিস্টেম সেটিংস")]),
    ("ta", &[("dash", "டாஷ்போர்டு"), ("fleet", "கப்பற்படை"), ("analytics", "பதிவுகள்"), ("routes", "வழி பகுப்பாய்வு"), ("alerts", "எச்சரிக்கைகள்"), ("settings", "அமைப்புகள்")]),
    ("te", &[("dash", "డాష్‌బోర్డ్"), ("fleet", "ఫ్లీట్ నిర్వహణ"), ("analytics", "టెలిమెట్రీ లాగ్‌లు"), ("routes", "రూట్ విశ్లేషణ"), ("alerts", "హెచ్చరికలు"), ("settings", "అమరికలు")]),
];

const LAYOUT: Section = &[
    ("en", &[("selectLang", "Select Language"), ("saveDefault", "Save preference"), ("name", "English")]),
    ("hi", &[("selectLang", "भाषा चुनें"), ("saveDefault", "सहेजें"), ("name", "हिंदी")]),
    ("gu", &[("selectLang", "ભાષા પસંદ કરો"), ("saveDefault", "સાચવો"), ("name", "ગુજરાતી")]),
    ("pa", &[("selectLang", "ਭਾਸ਼ਾ ਚੁਣੋ"), ("saveDefault", "ਸੇਵ ਕਰੋ"), ("name", "ਪੰਜਾਬੀ")]),
    ("mr", &[("selectLang", "भाषा निवडा"), ("saveDefault", "जतन करा"), ("name", "मराठी")]),
    ("bn", &[("selectLang", "ভাষা নির্বাচন করুন"), ("saveDefault", "সংরক্ষণ করুন"), ("name", "বাংলা")]),
    ("ta", &[("selectLang", "மொழியைத் தேர்ந்தெடுக்கவும்"), ("saveDefault", "சேமி"), ("name", "தமிழ்")]),
    ("te", &[("selectLang", "భాషను ఎంచుకోండి"), ("saveDefault", "సేవ్ చేయండి"), ("name", "తెలుగు")]),
];

const DASHBOARD: Section = &[
    ("en", &[("header", "Logistics Overview"), ("liveShipments", "Live Shipments"), ("truckId", "Truck ID"), ("status", "Status"), ("atRisk", "At Risk"), ("good", "Good"), ("temp", "Temp"), ("shock", "Shock"), ("hum", "Humidity")]),
    ("hi", &[("header", "लॉजिस्टिक्स अवलोकन"), ("liveShipments", "लाइव शिपमेंट"), ("truckId", "ट्रक आईडी"), ("status", "स्थिति"), ("atRisk", "खतरे में"), ("good", "सुरक्षित"), ("temp", "तापमान"), ("shock", "झटका"), ("hum", "नमी")]),
    ("gu", &[("header", "લોજિસ્ટિક્સ ઓવરવ્યુ"), ("liveShipments", "લાઇવ શિપમેન્ટ"), ("truckId", "ટ્રક આઈડી"), ("status", "સ્થિતિ"), ("atRisk", "જોખમમાં"), ("good", "સરસ"), ("temp", "તાપમાન"), ("shock", "આંચકો"), ("hum", "ભેજ")]),
];

const ALERTS: Section = &[
    ("en", &[("title", "Critical Risk Log"), ("incidents", "Total Incidents"), ("active", "Active Threats"), ("type", "Alert Type"), ("val", "Value"), ("loc", "Location"), ("time", "Time"), ("status", "Status")]),
    ("hi", &[("title", "गंभीर जोखिम लॉग"), ("incidents", "कुल घटनाएं"), ("active", "सक्रिय खतरे"), ("type", "अलर्ट प्रकार"), ("val", "मान"), ("loc", "स्थान"), ("time", "समय"), ("status", "स्थिति")]),
    ("gu", &[("title", "ગંભીર જોખમ લોગ"), ("incidents", "કુલ ઘટનાઓ"), ("active", "સક્રિય ધમકીઓ"), ("type", "પ્રકાર"), ("val", "મૂલ્ય"), ("loc", "સ્થાન"), ("time", "સમય"), ("status", "સ્થિતિ")]),
    ("pa", &[("title", "ਨਾਜ਼ੁਕ ਖਤਰਾ ਲੌਗ"), ("incidents", "ਕੁੱਲ ਘਟਨਾਵਾਂ"), ("active", "ਸਰਗਰਮ ਖਤਰੇ"), ("type", "ਕਿਸਮ"), ("val", "ਮੁੱਲ"), ("loc", "ਸਥਾਨ"), ("time", "ਸਮਾਂ"), ("status", "ਸਥਿਤੀ")]),
];

/// City name -> translations per language.
const CITIES: Section = &[
    ("Mumbai", &[("en", "Mumbai"), ("hi", "मुंबई"), ("gu", "મુંબઈ"), ("pa", "ਮੁੰਬਈ"), ("mr", "मुंबई"), ("bn", "মুম্বাই"), ("ta", "மும்பை"), ("te", "ముంబై")]),
    ("Pune", &[("en", "Pune"), ("hi", "पुणे"), ("gu", "પુણે"), ("pa", "ਪੁਣੇ"), ("mr", "पुणे"), ("bn", "পুনে"), ("ta", "புனே"), ("te", "పుణే")]),
    ("Nashik", &[("en", "Nashik"), ("hi", "नासिक"), ("gu", "નાસિક"), ("pa", "ਨਾਸਿਕ"), ("mr", "नाशिक"), ("bn", "নাসিক"), ("ta", "நாசிக்"), ("te", "నాసిక్")]),
    ("Surat", &[("en", "Surat"), ("hi", "सूरत"), ("gu", "સુરત"), ("pa", "ਸੂਰਤ"), ("mr", "सुरत"), ("bn", "সুরাট"), ("ta", "சூரத்"), ("te", "సూరత్")]),
    ("Vadodara", &[("en", "Vadodara"), ("hi", "वडोदरा"), ("gu", "વડોદરા"), ("pa", "ਵਡੋਦਰਾ"), ("mr", "वडोदरा"), ("bn", "ভদোদরা"), ("ta", "வதோதரா"), ("te", "వడోదర")]),
    ("Delhi", &[("en", "Delhi"), ("hi", "दिल्ली"), ("gu", "દિલ્હી"), ("pa", "ਦਿੱਲੀ"), ("mr", "दिल्ली"), ("bn", "দিল্লি"), ("ta", "டெல்லி"), ("te", "ఢిల్లీ")]),
    ("Ahmedabad", &[("en", "Ahmedabad"), ("hi", "अहमदाबाद"), ("gu", "અમદાવાદ"), ("pa", "ਅਹਿਮਦਾਬਾਦ"), ("mr", "अहमदाबाद"), ("bn", "আহমেদাবাদ"), ("ta", "அகமதாபாத்"), ("te", "అహ్మదాబాద్")]),
    ("Bangalore", &[("en", "Bangalore"), ("hi", "बंगलौर"), ("gu", "બેંગ્લોર"), ("pa", "ਬੈਂਗਲੁਰੂ"), ("mr", "बेंगळुरू"), ("bn", "বেঙ্গালুরু"), ("ta", "பெங்களூரு"), ("te", "బెంగళూరు")]),
    ("Chennai", &[("en", "Chennai"), ("hi", "चेन्नई"), ("gu", "ચેન્નાઈ"), ("pa", "ਚੇਨਈ"), ("mr", "चेन्नई"), ("bn", "চেন্নাই"), ("ta", "சென்னை"), ("te", "చెన్నై")]),
    ("Hyderabad", &[("en", "Hyderabad"), ("hi", "हैदराबाद"), ("gu", "હૈદરાબાદ"), ("pa", "ਹੈਦਰਾਬਾਦ"), ("mr", "हैदराबाद"), ("bn", "হায়দরাবাদ"), ("ta", "ஹைதராபாத்"), ("te", "హైదరాబాద్")]),
];

fn section(name: &str) -> Option<Section> {
    match name {
        "menu" => Some(MENU),
        "layout" => Some(LAYOUT),
        "dashboard" => Some(DASHBOARD),
        "alerts" => Some(ALERTS),
        _ => None,
    }
}

fn lookup(table: Section, outer: &str, inner: &str) -> Option<&'static str> {
    table
        .iter()
        .find(|(k, _)| *k == outer)
        .and_then(|(_, entries)| entries.iter().find(|(k, _)| *k == inner))
        .map(|(_, v)| *v)
}

/// UI string for `key` in `section`: the requested language, else English, else `key`.
pub fn t<'a>(section_name: &str, key: &'a str, lang: &str) -> &'a str {
    let Some(table) = section(section_name) else {
        return key;
    };
    lookup(table, lang, key)
        .or_else(|| lookup(table, "en", key))
        .unwrap_or(key)
}

/// City name in `lang`, or the name unchanged when unknown.
pub fn translate_city<'a>(city: &'a str, lang: &str) -> &'a str {
    lookup(CITIES, city, lang).unwrap_or(city)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_and_fallbacks() {
        assert_eq!(t("menu", "alerts", "hi"), "गंभीर अलर्ट");
        // dashboard has no Tamil table
        assert_eq!(t("dashboard", "truckId", "ta"), "Truck ID");
        assert_eq!(t("menu", "missingKey", "gu"), "missingKey");
        assert_eq!(t("nope", "dash", "en"), "dash");
    }

    #[test]
    fn test_cities() {
        assert_eq!(translate_city("Surat", "gu"), "સુરત");
        assert_eq!(translate_city("Surat", "xx"), "Surat");
        assert_eq!(translate_city("Rajkot", "hi"), "Rajkot");
    }

    #[test]
    fn test_languages() {
        let codes: Vec<&str> = available_languages().iter().map(|l| l.code).collect();
        assert_eq!(codes, vec!["en", "hi", "gu", "pa", "mr", "ta", "te", "bn"]);
        assert!(is_supported("te"));
        assert!(!is_supported("fr"));
        assert_eq!(language_label("gu"), "Gujarati (ગુજરાતી)");
    }
}
