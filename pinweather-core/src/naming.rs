//! Name derivation shared by the reconciler and the preloader.

use crate::model::CurrentWeather;

/// Language key looked up in a geocoding match's `local_names`.
pub const LOCAL_NAME_LANG: &str = "ko";

/// Localized name for a lookup: the geo match's `ko` name, then the geo name,
/// then the weather name.
pub fn localized_name(current: &CurrentWeather) -> String {
    current
        .geo
        .as_ref()
        .and_then(|g| g.local_name(LOCAL_NAME_LANG).or(Some(g.name.as_str())))
        .unwrap_or(current.weather.name.as_str())
        .trim()
        .to_string()
}

/// Country code from the geo match, if any.
pub fn country_code(current: &CurrentWeather) -> Option<String> {
    current
        .geo
        .as_ref()
        .and_then(|g| g.country.as_deref())
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
}

/// Label shown in city lists, e.g. "서울, 대한민국".
pub fn display_label(current: &CurrentWeather) -> String {
    let name = localized_name(current);
    match country_code(current) {
        Some(code) => format!("{name}, {}", country_name(&code)),
        None => name,
    }
}

/// Korean name for common ISO 3166 alpha-2 codes; other codes are returned as-is.
pub fn country_name(code: &str) -> String {
    let name = match code.to_ascii_uppercase().as_str() {
        "KR" => "대한민국",
        "KP" => "북한",
        "JP" => "일본",
        "CN" => "중국",
        "TW" => "대만",
        "HK" => "홍콩",
        "VN" => "베트남",
        "TH" => "태국",
        "SG" => "싱가포르",
        "PH" => "필리핀",
        "ID" => "인도네시아",
        "IN" => "인도",
        "AU" => "오스트레일리아",
        "NZ" => "뉴질랜드",
        "US" => "미국",
        "CA" => "캐나다",
        "MX" => "멕시코",
        "BR" => "브라질",
        "GB" => "영국",
        "FR" => "프랑스",
        "DE" => "독일",
        "IT" => "이탈리아",
        "ES" => "스페인",
        "NL" => "네덜란드",
        "RU" => "러시아",
        "TR" => "튀르키예",
        "EG" => "이집트",
        _ => return code.to_string(),
    };
    name.to_string()
}
