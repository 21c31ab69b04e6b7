use rand::Rng;

/// 获取当前 UTC 时间戳（毫秒）
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// 当前 UTC 时间的 RFC 3339 字符串（毫秒精度，`Z` 结尾）
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// 生成事件 ID: `evt_<unix_ms>_<9 位 base36 随机串>`
///
/// 时间戳前缀让 ID 大致按创建顺序排列，随机后缀避免同毫秒冲突。
pub fn event_id() -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("evt_{}_{}", now_millis(), suffix)
}

/// 解析 RFC 3339 时间为毫秒时间戳
pub fn parse_rfc3339_millis(ts: &str) -> Option<i64> {
    chrono::DateTime::parse_from_rfc3339(ts)
        .ok()
        .map(|dt| dt.timestamp_millis())
}
