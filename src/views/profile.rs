use tera::Context;

use crate::error::AppError;
use crate::models::AuthenticatedUser;
use crate::views::layout::PageContext;

pub fn render(page: &PageContext, user: &AuthenticatedUser) -> Result<String, AppError> {
    let mut context = Context::new();
    context.insert("user", user);
    page.render("profile.html", context)
}
