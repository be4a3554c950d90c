use globset::{GlobBuilder, GlobMatcher};

use crate::{RouterError, RouterResult};

/// Скомпилированный glob-шаблон канала.
///
/// Семантика shell-glob:
/// - `*` — любая (в том числе пустая) последовательность символов;
/// - `?` — ровно один символ;
/// - `[...]` / `[!...]` — класс символов и его отрицание;
/// - остальные символы (включая `.`, `{`, `}` и `,`) сравниваются буквально.
#[derive(Debug, Clone)]
pub struct ChannelPattern {
    source: String,
    matcher: GlobMatcher,
}

impl ChannelPattern {
    /// Компилирует шаблон. Некорректный синтаксис сразу даёт ошибку.
    pub fn new(pattern: &str) -> RouterResult<Self> {
        let glob = GlobBuilder::new(&escape_alternation(pattern))
            .literal_separator(false)
            .backslash_escape(true)
            .build()
            .map_err(|e| RouterError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.kind().to_string(),
            })?;

        Ok(Self {
            source: pattern.to_string(),
            matcher: glob.compile_matcher(),
        })
    }

    /// Проверяет, подходит ли имя события под шаблон.
    #[inline]
    pub fn is_match(
        &self,
        event: &str,
    ) -> bool {
        self.matcher.is_match(event)
    }

    /// Исходная строка шаблона.
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

/// Экранирует `{`, `}` и `,` вне классов символов: в `globset` это
/// синтаксис альтернатив, а в именах каналов (например, hash-tag
/// `{user}:events`) они встречаются как обычные символы.
fn escape_alternation(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars().peekable();
    let mut in_class = false;

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                out.push(c);
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            '[' if !in_class => {
                in_class = true;
                out.push(c);
                // `]` сразу после `[` или `[!` входит в класс.
                if let Some(&neg @ ('!' | '^')) = chars.peek() {
                    out.push(neg);
                    chars.next();
                }
                if chars.peek() == Some(&']') {
                    out.push(']');
                    chars.next();
                }
            }
            ']' if in_class => {
                in_class = false;
                out.push(c);
            }
            '{' | '}' | ',' if !in_class => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}
