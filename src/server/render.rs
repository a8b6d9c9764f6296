//! 简单的 HTML 页面渲染

use std::borrow::Cow;
use std::fmt::Write;

/// 网格中的一张图片
pub struct Tile<'a> {
    pub id: i64,
    pub path: Cow<'a, str>,
    /// 显示在图片下方的文字，例如相似度
    pub caption: Option<String>,
}

const STYLE: &str = r#"
body { font-family: sans-serif; margin: 0 auto; max-width: 1400px; padding: 1em; }
header { display: flex; gap: 1em; align-items: center; margin-bottom: 1em; }
header input[type=text] { flex: 1; padding: 0.4em; }
.grid { display: grid; grid-template-columns: repeat(auto-fill, minmax(200px, 1fr)); gap: 8px; }
.grid figure { margin: 0; }
.grid img { width: 100%; height: 200px; object-fit: cover; }
.grid figcaption { font-size: 0.8em; color: #666; }
.main img { max-width: 100%; max-height: 70vh; }
"#;

/// 转义 HTML 特殊字符
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// 图片文件的 URL，只编码在 URL 中有特殊含义的字符，其余交给浏览器处理
pub fn image_url(path: &str) -> String {
    let mut url = String::from("/img/");
    for c in path.chars() {
        match c {
            '%' => url.push_str("%25"),
            '#' => url.push_str("%23"),
            '?' => url.push_str("%3F"),
            _ => url.push(c),
        }
    }
    url
}

/// 页面框架，`body` 需要已经转义
pub fn page(title: &str, query: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{title}</title>
<style>{STYLE}</style>
</head>
<body>
<header>
<a href="/">Home</a>
<a href="/random">Random</a>
<form action="/text-query" method="get" style="display:flex;flex:1;gap:0.5em">
<input type="text" name="text" value="{query}" placeholder="Search">
<input type="submit" value="Search">
</form>
</header>
{body}
</body>
</html>
"#,
        title = escape(title),
        query = escape(query),
    )
}

/// 图片网格，每张图片链接到它的相似图片页面
pub fn grid(tiles: &[Tile]) -> String {
    let mut out = String::from(r#"<div class="grid">"#);
    for tile in tiles {
        let _ = write!(
            out,
            r#"<figure><a href="/image/{id}"><img src="{src}" alt="{alt}" loading="lazy"></a>"#,
            id = tile.id,
            src = escape(&image_url(&tile.path)),
            alt = escape(&tile.path),
        );
        if let Some(caption) = &tile.caption {
            let _ = write!(out, "<figcaption>{}</figcaption>", escape(caption));
        }
        out.push_str("</figure>");
    }
    out.push_str("</div>");
    out
}

/// 单张图片的大图
pub fn main_image(path: &str) -> String {
    format!(
        r#"<div class="main"><a href="{src}"><img src="{src}" alt="{alt}"></a><p>{alt}</p></div>"#,
        src = escape(&image_url(path)),
        alt = escape(path),
    )
}
