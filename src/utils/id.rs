//! 标识符工具
//!
//! - 启动 ID：每次启动尝试一个，10 位 62 进制字符串（0-9, a-z, A-Z）
//! - 模块/能力接口 ID 的格式校验

use std::sync::OnceLock;

use regex::Regex;

/// 62 进制字符集
const BASE62_CHARS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// 启动 ID 长度
const BOOT_ID_LENGTH: usize = 10;

/// 模块与能力接口 ID 的格式
///
/// 以字母或下划线开头，段之间可用 `.` `:` `-` `/` 分隔。
pub const MODULE_ID_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*([.:\-/][A-Za-z0-9_]+)*$";

fn module_id_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(MODULE_ID_PATTERN).ok()).as_ref()
}

/// 生成启动 ID
///
/// # Example
///
/// ```
/// use chips_boot::utils::id::generate_boot_id;
///
/// let id = generate_boot_id();
/// assert_eq!(id.len(), 10);
/// ```
pub fn generate_boot_id() -> String {
    let mut value = uuid::Uuid::new_v4().as_u128();

    let mut result = String::with_capacity(BOOT_ID_LENGTH);
    for _ in 0..BOOT_ID_LENGTH {
        result.push(BASE62_CHARS[(value % 62) as usize] as char);
        value /= 62;
    }
    result
}

/// 验证启动 ID 格式
pub fn is_valid_boot_id(id: &str) -> bool {
    id.len() == BOOT_ID_LENGTH && id.bytes().all(|b| BASE62_CHARS.contains(&b))
}

/// 验证模块或能力接口 ID 格式
///
/// # Example
///
/// ```
/// use chips_boot::utils::id::is_valid_module_id;
///
/// assert!(is_valid_module_id("chips.core"));
/// assert!(is_valid_module_id("vendor/search-index"));
/// assert!(!is_valid_module_id("9lives"));
/// assert!(!is_valid_module_id("trailing."));
/// ```
pub fn is_valid_module_id(id: &str) -> bool {
    module_id_regex().is_some_and(|re| re.is_match(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generate_boot_id_format() {
        for _ in 0..100 {
            let id = generate_boot_id();
            assert!(is_valid_boot_id(&id), "invalid boot id: {}", id);
        }
    }

    #[test]
    fn test_generate_boot_id_unique() {
        let ids: HashSet<_> = (0..1000).map(|_| generate_boot_id()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_is_valid_boot_id() {
        assert!(is_valid_boot_id("a1B2c3D4e5"));
        assert!(!is_valid_boot_id("short"));
        assert!(!is_valid_boot_id("a1B2c3D4e-"));
    }

    #[test]
    fn test_module_id_pattern() {
        assert!(is_valid_module_id("anchor"));
        assert!(is_valid_module_id("_private"));
        assert!(is_valid_module_id("chips:search.index_v2"));
        assert!(!is_valid_module_id(""));
        assert!(!is_valid_module_id("has space"));
        assert!(!is_valid_module_id("double..dot"));
    }
}
