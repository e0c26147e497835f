/// 展开配置文本中的环境变量。
///
/// 支持 `${NAME}`、`${NAME:-default}` 和 `$NAME`；未定义的变量展开为空串，
/// 单独的 `$` 原样保留。
pub fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }

        if chars.peek() == Some(&'{') {
            chars.next();
            let body: String = chars.by_ref().take_while(|&c| c != '}').collect();
            let value = match body.split_once(":-") {
                Some((name, default)) => std::env::var(name)
                    .ok()
                    .filter(|v| !v.is_empty())
                    .unwrap_or_else(|| default.to_string()),
                None => std::env::var(&body).unwrap_or_default(),
            };
            out.push_str(&value);
            continue;
        }

        let mut name = String::new();
        while let Some(&c) = chars.peek() {
            if !(c.is_ascii_alphanumeric() || c == '_') {
                break;
            }
            name.push(c);
            chars.next();
        }
        if name.is_empty() {
            out.push('$');
        } else {
            out.push_str(&std::env::var(&name).unwrap_or_default());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn braces_and_bare_names() {
        std::env::set_var("RB_TEST_HOST", "0.0.0.0");
        std::env::set_var("RB_TEST_PORT", "9000");
        assert_eq!(
            expand_env_vars("listen: ${RB_TEST_HOST}\nport: $RB_TEST_PORT\n"),
            "listen: 0.0.0.0\nport: 9000\n"
        );
        std::env::remove_var("RB_TEST_HOST");
        std::env::remove_var("RB_TEST_PORT");
    }

    #[test]
    fn defaults_apply_when_unset_or_empty() {
        std::env::remove_var("RB_TEST_MISSING");
        assert_eq!(expand_env_vars("level: ${RB_TEST_MISSING:-debug}"), "level: debug");

        std::env::set_var("RB_TEST_EMPTY", "");
        assert_eq!(expand_env_vars("${RB_TEST_EMPTY:-fallback}"), "fallback");
        std::env::remove_var("RB_TEST_EMPTY");

        std::env::set_var("RB_TEST_SET", "actual");
        assert_eq!(expand_env_vars("${RB_TEST_SET:-fallback}"), "actual");
        std::env::remove_var("RB_TEST_SET");
    }

    #[test]
    fn undefined_and_literal_dollar() {
        std::env::remove_var("RB_TEST_UNDEFINED");
        assert_eq!(expand_env_vars("secret: ${RB_TEST_UNDEFINED}"), "secret: ");
        assert_eq!(expand_env_vars("costs $ 5"), "costs $ 5");
        assert_eq!(expand_env_vars("plain text"), "plain text");
    }
}
