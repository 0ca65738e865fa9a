//! Country name → ISO 3166-1 alpha-2 resolution.
//!
//! The catalog reports countries by display name only, and those names do
//! not always match any one locale ("The Russian Federation", "Türkiye",
//! "Republic Of Korea").  Resolution tries, in order:
//!
//! 1. case-insensitive match against English display names and the
//!    alternate spellings other English locales use,
//! 2. the same tables compared with diacritics and typographic apostrophes
//!    folded away,
//! 3. a fallback table of long-form and historical names.
//!
//! A `None` result means the entry cannot be browsed by country code.

use std::collections::HashSet;

use crate::protocol::CountryEntry;

/// English display names, one per assigned code.
static ISO_NAMES: &[(&str, &str)] = &[
    ("AD", "Andorra"),
    ("AE", "United Arab Emirates"),
    ("AF", "Afghanistan"),
    ("AG", "Antigua & Barbuda"),
    ("AI", "Anguilla"),
    ("AL", "Albania"),
    ("AM", "Armenia"),
    ("AO", "Angola"),
    ("AQ", "Antarctica"),
    ("AR", "Argentina"),
    ("AS", "American Samoa"),
    ("AT", "Austria"),
    ("AU", "Australia"),
    ("AW", "Aruba"),
    ("AX", "Åland Islands"),
    ("AZ", "Azerbaijan"),
    ("BA", "Bosnia & Herzegovina"),
    ("BB", "Barbados"),
    ("BD", "Bangladesh"),
    ("BE", "Belgium"),
    ("BF", "Burkina Faso"),
    ("BG", "Bulgaria"),
    ("BH", "Bahrain"),
    ("BI", "Burundi"),
    ("BJ", "Benin"),
    ("BL", "St. Barthélemy"),
    ("BM", "Bermuda"),
    ("BN", "Brunei"),
    ("BO", "Bolivia"),
    ("BQ", "Caribbean Netherlands"),
    ("BR", "Brazil"),
    ("BS", "Bahamas"),
    ("BT", "Bhutan"),
    ("BV", "Bouvet Island"),
    ("BW", "Botswana"),
    ("BY", "Belarus"),
    ("BZ", "Belize"),
    ("CA", "Canada"),
    ("CC", "Cocos (Keeling) Islands"),
    ("CD", "Congo - Kinshasa"),
    ("CF", "Central African Republic"),
    ("CG", "Congo - Brazzaville"),
    ("CH", "Switzerland"),
    ("CI", "Côte d’Ivoire"),
    ("CK", "Cook Islands"),
    ("CL", "Chile"),
    ("CM", "Cameroon"),
    ("CN", "China"),
    ("CO", "Colombia"),
    ("CR", "Costa Rica"),
    ("CU", "Cuba"),
    ("CV", "Cape Verde"),
    ("CW", "Curaçao"),
    ("CX", "Christmas Island"),
    ("CY", "Cyprus"),
    ("CZ", "Czechia"),
    ("DE", "Germany"),
    ("DJ", "Djibouti"),
    ("DK", "Denmark"),
    ("DM", "Dominica"),
    ("DO", "Dominican Republic"),
    ("DZ", "Algeria"),
    ("EC", "Ecuador"),
    ("EE", "Estonia"),
    ("EG", "Egypt"),
    ("EH", "Western Sahara"),
    ("ER", "Eritrea"),
    ("ES", "Spain"),
    ("ET", "Ethiopia"),
    ("FI", "Finland"),
    ("FJ", "Fiji"),
    ("FK", "Falkland Islands"),
    ("FM", "Micronesia"),
    ("FO", "Faroe Islands"),
    ("FR", "France"),
    ("GA", "Gabon"),
    ("GB", "United Kingdom"),
    ("GD", "Grenada"),
    ("GE", "Georgia"),
    ("GF", "French Guiana"),
    ("GG", "Guernsey"),
    ("GH", "Ghana"),
    ("GI", "Gibraltar"),
    ("GL", "Greenland"),
    ("GM", "Gambia"),
    ("GN", "Guinea"),
    ("GP", "Guadeloupe"),
    ("GQ", "Equatorial Guinea"),
    ("GR", "Greece"),
    ("GS", "South Georgia & South Sandwich Islands"),
    ("GT", "Guatemala"),
    ("GU", "Guam"),
    ("GW", "Guinea-Bissau"),
    ("GY", "Guyana"),
    ("HK", "Hong Kong SAR China"),
    ("HM", "Heard & McDonald Islands"),
    ("HN", "Honduras"),
    ("HR", "Croatia"),
    ("HT", "Haiti"),
    ("HU", "Hungary"),
    ("ID", "Indonesia"),
    ("IE", "Ireland"),
    ("IL", "Israel"),
    ("IM", "Isle of Man"),
    ("IN", "India"),
    ("IO", "British Indian Ocean Territory"),
    ("IQ", "Iraq"),
    ("IR", "Iran"),
    ("IS", "Iceland"),
    ("IT", "Italy"),
    ("JE", "Jersey"),
    ("JM", "Jamaica"),
    ("JO", "Jordan"),
    ("JP", "Japan"),
    ("KE", "Kenya"),
    ("KG", "Kyrgyzstan"),
    ("KH", "Cambodia"),
    ("KI", "Kiribati"),
    ("KM", "Comoros"),
    ("KN", "St. Kitts & Nevis"),
    ("KP", "North Korea"),
    ("KR", "South Korea"),
    ("KW", "Kuwait"),
    ("KY", "Cayman Islands"),
    ("KZ", "Kazakhstan"),
    ("LA", "Laos"),
    ("LB", "Lebanon"),
    ("LC", "St. Lucia"),
    ("LI", "Liechtenstein"),
    ("LK", "Sri Lanka"),
    ("LR", "Liberia"),
    ("LS", "Lesotho"),
    ("LT", "Lithuania"),
    ("LU", "Luxembourg"),
    ("LV", "Latvia"),
    ("LY", "Libya"),
    ("MA", "Morocco"),
    ("MC", "Monaco"),
    ("MD", "Moldova"),
    ("ME", "Montenegro"),
    ("MF", "St. Martin"),
    ("MG", "Madagascar"),
    ("MH", "Marshall Islands"),
    ("MK", "North Macedonia"),
    ("ML", "Mali"),
    ("MM", "Myanmar (Burma)"),
    ("MN", "Mongolia"),
    ("MO", "Macao SAR China"),
    ("MP", "Northern Mariana Islands"),
    ("MQ", "Martinique"),
    ("MR", "Mauritania"),
    ("MS", "Montserrat"),
    ("MT", "Malta"),
    ("MU", "Mauritius"),
    ("MV", "Maldives"),
    ("MW", "Malawi"),
    ("MX", "Mexico"),
    ("MY", "Malaysia"),
    ("MZ", "Mozambique"),
    ("NA", "Namibia"),
    ("NC", "New Caledonia"),
    ("NE", "Niger"),
    ("NF", "Norfolk Island"),
    ("NG", "Nigeria"),
    ("NI", "Nicaragua"),
    ("NL", "Netherlands"),
    ("NO", "Norway"),
    ("NP", "Nepal"),
    ("NR", "Nauru"),
    ("NU", "Niue"),
    ("NZ", "New Zealand"),
    ("OM", "Oman"),
    ("PA", "Panama"),
    ("PE", "Peru"),
    ("PF", "French Polynesia"),
    ("PG", "Papua New Guinea"),
    ("PH", "Philippines"),
    ("PK", "Pakistan"),
    ("PL", "Poland"),
    ("PM", "St. Pierre & Miquelon"),
    ("PN", "Pitcairn Islands"),
    ("PR", "Puerto Rico"),
    ("PS", "Palestinian Territories"),
    ("PT", "Portugal"),
    ("PW", "Palau"),
    ("PY", "Paraguay"),
    ("QA", "Qatar"),
    ("RE", "Réunion"),
    ("RO", "Romania"),
    ("RS", "Serbia"),
    ("RU", "Russia"),
    ("RW", "Rwanda"),
    ("SA", "Saudi Arabia"),
    ("SB", "Solomon Islands"),
    ("SC", "Seychelles"),
    ("SD", "Sudan"),
    ("SE", "Sweden"),
    ("SG", "Singapore"),
    ("SH", "St. Helena"),
    ("SI", "Slovenia"),
    ("SJ", "Svalbard & Jan Mayen"),
    ("SK", "Slovakia"),
    ("SL", "Sierra Leone"),
    ("SM", "San Marino"),
    ("SN", "Senegal"),
    ("SO", "Somalia"),
    ("SR", "Suriname"),
    ("SS", "South Sudan"),
    ("ST", "São Tomé & Príncipe"),
    ("SV", "El Salvador"),
    ("SX", "Sint Maarten"),
    ("SY", "Syria"),
    ("SZ", "Eswatini"),
    ("TC", "Turks & Caicos Islands"),
    ("TD", "Chad"),
    ("TF", "French Southern Territories"),
    ("TG", "Togo"),
    ("TH", "Thailand"),
    ("TJ", "Tajikistan"),
    ("TK", "Tokelau"),
    ("TL", "Timor-Leste"),
    ("TM", "Turkmenistan"),
    ("TN", "Tunisia"),
    ("TO", "Tonga"),
    ("TR", "Türkiye"),
    ("TT", "Trinidad & Tobago"),
    ("TV", "Tuvalu"),
    ("TW", "Taiwan"),
    ("TZ", "Tanzania"),
    ("UA", "Ukraine"),
    ("UG", "Uganda"),
    ("UM", "U.S. Outlying Islands"),
    ("US", "United States"),
    ("UY", "Uruguay"),
    ("UZ", "Uzbekistan"),
    ("VA", "Vatican City"),
    ("VC", "St. Vincent & Grenadines"),
    ("VE", "Venezuela"),
    ("VG", "British Virgin Islands"),
    ("VI", "U.S. Virgin Islands"),
    ("VN", "Vietnam"),
    ("VU", "Vanuatu"),
    ("WF", "Wallis & Futuna"),
    ("WS", "Samoa"),
    ("XK", "Kosovo"),
    ("YE", "Yemen"),
    ("YT", "Mayotte"),
    ("ZA", "South Africa"),
    ("ZM", "Zambia"),
    ("ZW", "Zimbabwe"),
];

/// Spellings used by other English locales and the ISO short names.
static LOCALE_VARIANTS: &[(&str, &str)] = &[
    ("AG", "Antigua and Barbuda"),
    ("BA", "Bosnia and Herzegovina"),
    ("BL", "Saint Barthélemy"),
    ("CD", "Democratic Republic of the Congo"),
    ("CG", "Republic of the Congo"),
    ("CI", "Ivory Coast"),
    ("CV", "Cabo Verde"),
    ("CZ", "Czech Republic"),
    ("FK", "Falkland Islands (Islas Malvinas)"),
    ("HK", "Hong Kong"),
    ("KN", "Saint Kitts and Nevis"),
    ("LC", "Saint Lucia"),
    ("MF", "Saint Martin"),
    ("MM", "Myanmar"),
    ("MO", "Macao"),
    ("MO", "Macau"),
    ("PM", "Saint Pierre and Miquelon"),
    ("PS", "Palestine"),
    ("SH", "Saint Helena"),
    ("ST", "Sao Tome and Principe"),
    ("SZ", "Swaziland"),
    ("TC", "Turks and Caicos Islands"),
    ("TL", "East Timor"),
    ("TR", "Turkey"),
    ("TT", "Trinidad and Tobago"),
    ("VA", "Holy See"),
    ("VC", "Saint Vincent and the Grenadines"),
    ("WF", "Wallis and Futuna"),
];

/// Long-form and historical names the locale tables do not carry.
static FALLBACK_NAMES: &[(&str, &str)] = &[
    ("the united states of america", "US"),
    ("united states of america", "US"),
    ("usa", "US"),
    ("the united kingdom of great britain and northern ireland", "GB"),
    ("united kingdom of great britain and northern ireland", "GB"),
    ("great britain", "GB"),
    ("the russian federation", "RU"),
    ("russian federation", "RU"),
    ("republic of korea", "KR"),
    ("korea, republic of", "KR"),
    ("korea", "KR"),
    ("the democratic people's republic of korea", "KP"),
    ("democratic people's republic of korea", "KP"),
    ("korea, democratic people's republic of", "KP"),
    ("the netherlands", "NL"),
    ("holland", "NL"),
    ("iran (islamic republic of)", "IR"),
    ("islamic republic of iran", "IR"),
    ("viet nam", "VN"),
    ("bolivarian republic of venezuela", "VE"),
    ("venezuela (bolivarian republic of)", "VE"),
    ("plurinational state of bolivia", "BO"),
    ("bolivia (plurinational state of)", "BO"),
    ("taiwan, republic of china", "TW"),
    ("taiwan, province of china", "TW"),
    ("the czech republic", "CZ"),
    ("republic of north macedonia", "MK"),
    ("the republic of north macedonia", "MK"),
    ("macedonia", "MK"),
    ("the kingdom of eswatini", "SZ"),
    ("the philippines", "PH"),
    ("the republic of moldova", "MD"),
    ("republic of moldova", "MD"),
    ("the united republic of tanzania", "TZ"),
    ("united republic of tanzania", "TZ"),
    ("the lao people's democratic republic", "LA"),
    ("lao people's democratic republic", "LA"),
    ("syrian arab republic", "SY"),
    ("the syrian arab republic", "SY"),
    ("the dominican republic", "DO"),
    ("the democratic republic of the congo", "CD"),
    ("the congo", "CG"),
    ("state of palestine", "PS"),
    ("the state of palestine", "PS"),
    ("brunei darussalam", "BN"),
    ("cote d'ivoire", "CI"),
    ("the bahamas", "BS"),
    ("the gambia", "GM"),
    ("the sudan", "SD"),
    ("the niger", "NE"),
    ("the united arab emirates", "AE"),
    ("the central african republic", "CF"),
    ("the comoros", "KM"),
    ("the cayman islands", "KY"),
    ("the faroe islands", "FO"),
    ("the falkland islands (malvinas)", "FK"),
    ("the holy see", "VA"),
    ("the marshall islands", "MH"),
    ("micronesia (federated states of)", "FM"),
    ("federated states of micronesia", "FM"),
    ("the northern mariana islands", "MP"),
    ("the solomon islands", "SB"),
    ("the turks and caicos islands", "TC"),
    ("virgin islands (british)", "VG"),
    ("virgin islands (u.s.)", "VI"),
    ("kosovo", "XK"),
];

/// Fold a name for loose comparison: lowercase, strip Latin diacritics,
/// normalise typographic apostrophes and collapse whitespace.
pub fn fold(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '’' | '‘' | 'ʼ' | '`' | '´' => out.push('\''),
            '&' => out.push_str("and"),
            _ => match fold_char(c) {
                Some(base) => out.push_str(base),
                None => out.extend(c.to_lowercase()),
            },
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn fold_char(c: char) -> Option<&'static str> {
    let base = match c {
        'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' | 'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'Ā' | 'ā'
        | 'Ă' | 'ă' | 'Ą' | 'ą' => "a",
        'Æ' | 'æ' => "ae",
        'Ç' | 'ç' | 'Ć' | 'ć' | 'Č' | 'č' => "c",
        'Ď' | 'ď' | 'Đ' | 'đ' => "d",
        'È' | 'É' | 'Ê' | 'Ë' | 'è' | 'é' | 'ê' | 'ë' | 'Ē' | 'ē' | 'Ė' | 'ė' | 'Ę' | 'ę'
        | 'Ě' | 'ě' => "e",
        'Ğ' | 'ğ' => "g",
        'Ì' | 'Í' | 'Î' | 'Ï' | 'ì' | 'í' | 'î' | 'ï' | 'Ī' | 'ī' | 'İ' | 'ı' => "i",
        'Ł' | 'ł' => "l",
        'Ñ' | 'ñ' | 'Ń' | 'ń' | 'Ň' | 'ň' => "n",
        'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' | 'Ø' | 'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'Ō' | 'ō'
        | 'Ő' | 'ő' => "o",
        'Œ' | 'œ' => "oe",
        'Ř' | 'ř' => "r",
        'Ś' | 'ś' | 'Š' | 'š' | 'Ş' | 'ş' | 'Ș' | 'ș' => "s",
        'ß' => "ss",
        'Ť' | 'ť' | 'Ţ' | 'ţ' | 'Ț' | 'ț' => "t",
        'Ù' | 'Ú' | 'Û' | 'Ü' | 'ù' | 'ú' | 'û' | 'ü' | 'Ū' | 'ū' | 'Ů' | 'ů' | 'Ű' | 'ű' => {
            "u"
        }
        'Ý' | 'ý' | 'ÿ' | 'Ÿ' => "y",
        'Ź' | 'ź' | 'Ż' | 'ż' | 'Ž' | 'ž' => "z",
        _ => return None,
    };
    Some(base)
}

fn locale_names() -> impl Iterator<Item = &'static (&'static str, &'static str)> {
    ISO_NAMES.iter().chain(LOCALE_VARIANTS.iter())
}

/// Resolve a free-text country name to an uppercase alpha-2 code.
pub fn resolve(name: &str) -> Option<String> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    if let Some((code, _)) = locale_names().find(|(_, n)| n.eq_ignore_ascii_case(name)) {
        return Some((*code).to_string());
    }

    let folded = fold(name);
    if let Some((code, _)) = locale_names().find(|(_, n)| fold(n) == folded) {
        return Some((*code).to_string());
    }

    FALLBACK_NAMES
        .iter()
        .find(|(n, _)| fold(n) == folded)
        .map(|(_, code)| (*code).to_string())
}

/// English display name for an alpha-2 code.
pub fn region_name(code: &str) -> Option<&'static str> {
    let code = code.trim();
    ISO_NAMES
        .iter()
        .find(|(c, _)| c.eq_ignore_ascii_case(code))
        .map(|(_, name)| *name)
}

/// Exactly two ASCII letters.
pub fn is_alpha2(code: &str) -> bool {
    code.len() == 2 && code.bytes().all(|b| b.is_ascii_alphabetic())
}

/// Keep the first entry for each name.
pub fn dedupe_by_name(entries: Vec<CountryEntry>) -> Vec<CountryEntry> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|e| seen.insert(e.name.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_exact_names() {
        assert_eq!(resolve("Germany").as_deref(), Some("DE"));
        assert_eq!(resolve("germany").as_deref(), Some("DE"));
        assert_eq!(resolve("  Japan ").as_deref(), Some("JP"));
        assert_eq!(resolve("Czech Republic").as_deref(), Some("CZ"));
        assert_eq!(resolve("Turkey").as_deref(), Some("TR"));
    }

    #[test]
    fn test_resolve_diacritic_insensitive() {
        assert_eq!(resolve("Turkiye").as_deref(), Some("TR"));
        assert_eq!(resolve("Reunion").as_deref(), Some("RE"));
        assert_eq!(resolve("Côte D'ivoire").as_deref(), Some("CI"));
        assert_eq!(resolve("Aland Islands").as_deref(), Some("AX"));
        assert_eq!(resolve("Curacao").as_deref(), Some("CW"));
        assert_eq!(resolve("Bosnia And Herzegovina").as_deref(), Some("BA"));
    }

    #[test]
    fn test_resolve_fallback_table() {
        assert_eq!(resolve("The United States Of America").as_deref(), Some("US"));
        assert_eq!(resolve("The Russian Federation").as_deref(), Some("RU"));
        assert_eq!(resolve("Republic Of Korea").as_deref(), Some("KR"));
        assert_eq!(
            resolve("The Democratic People’s Republic Of Korea").as_deref(),
            Some("KP")
        );
        assert_eq!(resolve("The Netherlands").as_deref(), Some("NL"));
        assert_eq!(
            resolve("The United Kingdom Of Great Britain And Northern Ireland").as_deref(),
            Some("GB")
        );
    }

    #[test]
    fn test_resolve_unknown() {
        assert_eq!(resolve("Atlantis"), None);
        assert_eq!(resolve(""), None);
        assert_eq!(resolve("   "), None);
    }

    #[test]
    fn test_region_name() {
        assert_eq!(region_name("de"), Some("Germany"));
        assert_eq!(region_name("GB"), Some("United Kingdom"));
        assert_eq!(region_name("QQ"), None);
    }

    #[test]
    fn test_fold() {
        assert_eq!(fold("  São   Tomé & Príncipe "), "sao tome and principe");
        assert_eq!(fold("Côte d’Ivoire"), "cote d'ivoire");
    }

    #[test]
    fn test_is_alpha2() {
        assert!(is_alpha2("DE"));
        assert!(is_alpha2("de"));
        assert!(!is_alpha2("D1"));
        assert!(!is_alpha2("DEU"));
        assert!(!is_alpha2("É"));
    }

    #[test]
    fn test_dedupe_keeps_first() {
        let entry = |name: &str, count| CountryEntry {
            name: name.into(),
            code: resolve(name),
            station_count: count,
            is_local: false,
        };
        let out = dedupe_by_name(vec![
            entry("Germany", 10),
            entry("France", 3),
            entry("Germany", 99),
        ]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].station_count, 10);
        assert_eq!(out[1].name, "France");
    }
}
