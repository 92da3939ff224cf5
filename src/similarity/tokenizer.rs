//! 源码规范化：去掉注释和空白，切分为词法单元
//!
//! 注释语法按文件扩展名决定。Python 的 `//` 是整除，C 的 `#include` 是预处理指令，
//! 两者都必须保留为词法单元。

use phf::phf_set;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

/// 字符串、标识符、数字和其余单个非空白字符
const CODE_TOKENS: &str =
    r#""(?:[^"\\\n]|\\.)*"|'(?:[^'\\\n]|\\.)*'|[A-Za-z_][A-Za-z0-9_]*|[0-9]+(?:\.[0-9]+)?|\S"#;

/// 注释放在最前面的分支里，一次扫描即可保证字符串中的注释符号不被误认
static HASH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"#[^\n]*|{}", CODE_TOKENS)).expect("valid regex"));

static C_LIKE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"(?s)/\*.*?\*/|//[^\n]*|{}", CODE_TOKENS)).expect("valid regex"));

static PLAIN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(CODE_TOKENS).expect("valid regex"));

/// 使用 `#` 行注释的扩展名
static HASH_EXTENSIONS: phf::Set<&'static str> = phf_set! {
    "py", "pyi", "pyw", "sh", "bash", "zsh", "rb", "pl", "r",
    "yml", "yaml", "toml", "cfg", "conf", "ini",
};

/// 没有扩展名、但使用 `#` 注释的文件
static HASH_FILE_NAMES: phf::Set<&'static str> = phf_set! {
    "makefile", "dockerfile", ".gitignore", ".env",
};

/// 使用 `//` 与 `/* */` 注释的扩展名
static C_LIKE_EXTENSIONS: phf::Set<&'static str> = phf_set! {
    "c", "h", "cc", "cpp", "cxx", "hpp", "hh",
    "java", "kt", "kts", "scala", "groovy",
    "js", "jsx", "mjs", "cjs", "ts", "tsx",
    "cs", "go", "rs", "swift", "dart", "php", "css", "scss",
};

/// 一种文件的注释语法
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentStyle {
    /// `#` 行注释
    Hash,
    /// `//` 行注释和 `/* */` 块注释
    CLike,
    /// 不认识的文件，不去掉任何内容
    Plain,
}

impl CommentStyle {
    pub fn for_path(path: &str) -> Self {
        let path = Path::new(path);
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some(ext) if HASH_EXTENSIONS.contains(ext) => CommentStyle::Hash,
            Some(ext) if C_LIKE_EXTENSIONS.contains(ext) => CommentStyle::CLike,
            Some(_) => CommentStyle::Plain,
            None => {
                let name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(str::to_ascii_lowercase)
                    .unwrap_or_default();
                if HASH_FILE_NAMES.contains(name.as_str()) {
                    CommentStyle::Hash
                } else {
                    CommentStyle::Plain
                }
            }
        }
    }

    fn regex(self) -> &'static Regex {
        match self {
            CommentStyle::Hash => &*HASH_RE,
            CommentStyle::CLike => &*C_LIKE_RE,
            CommentStyle::Plain => &*PLAIN_RE,
        }
    }

    fn is_comment(self, token: &str) -> bool {
        match self {
            CommentStyle::Hash => token.starts_with('#'),
            CommentStyle::CLike => token.starts_with("//") || token.starts_with("/*"),
            CommentStyle::Plain => false,
        }
    }
}

/// 按 `path` 的注释语法切分源码为词法单元
pub fn tokenize<'a>(path: &str, source: &'a str) -> Vec<&'a str> {
    tokenize_with(source, CommentStyle::for_path(path))
}

/// 切分源码为词法单元
///
/// 只去掉该语法下的注释；空白只起分隔作用，不产生词法单元。
/// 标识符、数字、字符串字面量各算一个单元，其余非空白字符逐个成为单元。
pub fn tokenize_with(source: &str, style: CommentStyle) -> Vec<&str> {
    style
        .regex()
        .find_iter(source)
        .map(|m| m.as_str())
        .filter(|token| !style.is_comment(token))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_identifiers_numbers_and_punctuation() {
        assert_eq!(
            tokenize("calc.js", "total=price*1.5;"),
            vec!["total", "=", "price", "*", "1.5", ";"]
        );
    }

    #[test]
    fn python_drops_hash_comments_but_keeps_strings() {
        let source = "# header\nx = \"a # not a comment\"  # trailing\ny = 'it\\'s'\n";
        assert_eq!(tokenize("main.py", source), vec!["x", "=", "\"a # not a comment\"", "y", "=", r"'it\'s'"]);
    }

    #[test]
    fn python_floor_division_is_code() {
        assert_eq!(
            tokenize("main.py", "half = total // 2 + offset * scale"),
            vec!["half", "=", "total", "/", "/", "2", "+", "offset", "*", "scale"]
        );
        assert_eq!(tokenize("util.py", "a // b + c"), vec!["a", "/", "/", "b", "+", "c"]);
    }

    #[test]
    fn c_like_drops_slash_comments_but_keeps_preprocessor_lines() {
        let source = "#include <stdio.h>\n#define N 10 // size\n/* block\n   comment */ int x = N;";
        assert_eq!(
            tokenize("main.c", source),
            vec!["#", "include", "<", "stdio", ".", "h", ">", "#", "define", "N", "10", "int", "x", "=", "N", ";"]
        );
        assert_eq!(tokenize("Main.java", "String s = \"http://x\"; // url"), vec!["String", "s", "=", "\"http://x\"", ";"]);
    }

    #[test]
    fn unknown_files_keep_everything() {
        assert_eq!(tokenize("notes.md", "# Title // x"), vec!["#", "Title", "/", "/", "x"]);
        assert_eq!(CommentStyle::for_path("docs/README"), CommentStyle::Plain);
    }

    #[test]
    fn style_follows_extension_and_file_name() {
        assert_eq!(CommentStyle::for_path("src/app.PY"), CommentStyle::Hash);
        assert_eq!(CommentStyle::for_path("deploy/Dockerfile"), CommentStyle::Hash);
        assert_eq!(CommentStyle::for_path(".github/ci.yml"), CommentStyle::Hash);
        assert_eq!(CommentStyle::for_path("web/index.ts"), CommentStyle::CLike);
        assert_eq!(CommentStyle::for_path("data.csv"), CommentStyle::Plain);
    }

    #[test]
    fn whitespace_is_irrelevant() {
        assert_eq!(
            tokenize("f.py", "def f(a,b):\n    return a+b"),
            tokenize("f.py", "def f( a , b ):\n\n\treturn a + b")
        );
        assert!(tokenize("f.py", "  \n\t # only a comment").is_empty());
        assert!(tokenize("f.rs", "  \n\t // only a comment").is_empty());
    }
}
