use serde::Serialize;
use tera::Context;

use crate::db::repositories::{MediaItem, MediaKind};
use crate::error::AppError;
use crate::utils::pagination::Page;
use crate::views::layout::{Options, PageContext, Pager};

#[derive(Serialize)]
struct MediaRow<'a> {
    #[serde(flatten)]
    item: &'a MediaItem,
    is_image: bool,
}

pub fn render(
    page: &PageContext,
    items: &Page<MediaItem>,
    kind: Option<MediaKind>,
    max_bytes: usize,
) -> Result<String, AppError> {
    let selected = kind.map(|k| k.as_str()).unwrap_or("");
    let kinds: Options = MediaKind::ALL
        .iter()
        .map(|k| (k.as_str().to_string(), k.label().to_string()))
        .collect();
    let rows: Vec<MediaRow<'_>> = items
        .items
        .iter()
        .map(|item| MediaRow {
            item,
            is_image: item.is_image(),
        })
        .collect();

    let mut context = Context::new();
    context.insert("kinds", &kinds);
    context.insert("kind", selected);
    context.insert("max_bytes", &max_bytes);
    context.insert("rows", &rows);
    context.insert("pager", &Pager::new(items, "/media", &[("type", selected.to_string())]));
    page.render("media.html", context)
}
