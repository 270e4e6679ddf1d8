use md5::{Digest, Md5};

/// 垃圾内容关键词黑名单
///
/// 内容策略词和联系方式引流词混在一张表里，阈值为2，
/// 属于可替换的策略配置，不是精确的分类器。
const SPAM_KEYWORDS: &[&str] = &[
    "广告", "推广", "spam", "色情", "赌博", "借贷", "贷款",
    "微信", "qq", "加我", "联系我", "http://", "https://",
    "点击", "优惠", "打折", "免费", "赚钱",
];

/// 生成邮箱MD5哈希（用于Gravatar头像）
///
/// 对小写、去空白后的邮箱取哈希，保证同一邮箱的不同写法
/// 始终得到同一个头像键。
pub fn generate_email_hash(email: &str) -> String {
    let normalized = email.trim().to_lowercase();
    let mut hasher = Md5::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}

/// 清理内容，转义HTML敏感字符防止XSS
///
/// 入库的永远是转义后的形式，不保留原始文本。
pub fn sanitize_content(content: &str) -> String {
    let mut escaped = String::with_capacity(content.len());
    for c in content.trim().chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// 检查是否为垃圾内容：命中2个及以上不同关键词即判定
pub fn check_spam_content(content: &str) -> bool {
    let content_lower = content.to_lowercase();
    let spam_count = SPAM_KEYWORDS
        .iter()
        .filter(|keyword| content_lower.contains(*keyword))
        .count();
    spam_count >= 2
}
