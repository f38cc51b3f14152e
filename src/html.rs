//! Server-rendered pages.

use atlas_auth::User;
use axum::http::StatusCode;
use axum::response::Html;

use crate::items::Item;
use crate::notify::{Level, Notification};
use crate::theme::Theme;

/// Escape text for HTML bodies and attribute values.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// What every page shares
pub struct Chrome<'a> {
    /// Stored preference
    pub theme: Theme,
    /// Theme actually rendered
    pub resolved: Theme,
    pub notifications: &'a [Notification],
    pub user: Option<&'a User>,
    /// Path the theme switcher returns to
    pub path: &'a str,
}

fn notifications(items: &[Notification]) -> String {
    items
        .iter()
        .map(|n| {
            let class = match n.level {
                Level::Success => "toast toast-success",
                Level::Error => "toast toast-error",
            };
            let description = if n.description.is_empty() {
                String::new()
            } else {
                format!("<p>{}</p>", escape(&n.description))
            };
            format!(
                r#"<div class="{}" role="status"><strong>{}</strong>{}</div>"#,
                class,
                escape(&n.title),
                description
            )
        })
        .collect()
}

fn theme_switcher(current: Theme, path: &str) -> String {
    let options: String = [Theme::Light, Theme::Dark, Theme::System]
        .iter()
        .map(|theme| {
            let selected = if *theme == current { " selected" } else { "" };
            format!(r#"<option value="{0}"{1}>{0}</option>"#, theme.as_str(), selected)
        })
        .collect();
    format!(
        r#"<form class="theme" action="/theme" method="post"><input type="hidden" name="return_to" value="{}"><select name="theme">{}</select><button type="submit">Apply</button></form>"#,
        escape(path),
        options
    )
}

fn layout(chrome: &Chrome<'_>, title: &str, body: &str) -> Html<String> {
    let account = match chrome.user {
        Some(user) => format!(
            r#"<span class="account">{}</span><form action="/auth/signout" method="post"><button type="submit">Sign out</button></form>"#,
            escape(user.email.as_deref().unwrap_or(&user.id))
        ),
        None => String::new(),
    };
    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en" data-theme="{theme}">
<head><meta charset="utf-8"><title>{title} | Atlas</title></head>
<body>
<header><a href="/">Atlas</a>{account}{switcher}</header>
<section class="toasts">{toasts}</section>
<main>
{body}
</main>
</body>
</html>"#,
        theme = chrome.resolved.as_str(),
        title = escape(title),
        account = account,
        switcher = theme_switcher(chrome.theme, chrome.path),
        toasts = notifications(chrome.notifications),
        body = body,
    ))
}

fn error_banner(error: Option<&str>) -> String {
    error
        .map(|e| format!(r#"<p class="error" role="alert">{}</p>"#, escape(e)))
        .unwrap_or_default()
}

pub fn landing(chrome: &Chrome<'_>) -> Html<String> {
    let call_to_action = if chrome.user.is_some() {
        r#"<a href="/dashboard">Go to dashboard</a>"#
    } else {
        r#"<a href="/login">Sign in</a>"#
    };
    layout(
        chrome,
        "Welcome",
        &format!("<h1>Atlas</h1><p>Keep track of your items.</p>{}", call_to_action),
    )
}

pub fn login(chrome: &Chrome<'_>, error: Option<&str>, next: Option<&str>) -> Html<String> {
    let next = next
        .map(|n| format!(r#"<input type="hidden" name="next" value="{}">"#, escape(n)))
        .unwrap_or_default();
    let body = format!(
        r#"<h1>Sign in</h1>
{error}
<form action="/login" method="post">
{next}
<label>Email <input type="email" name="email" required></label>
<label>Password <input type="password" name="password"></label>
<button type="submit" name="action" value="password">Sign in</button>
<button type="submit" name="action" value="signup">Create account</button>
<button type="submit" name="action" value="magic-link">Email me a magic link</button>
</form>
<form action="/login" method="post">
<input type="hidden" name="action" value="oauth">
<button type="submit" name="provider" value="google">Continue with Google</button>
</form>
<p><a href="/reset-password">Forgot your password?</a></p>"#,
        error = error_banner(error),
        next = next,
    );
    layout(chrome, "Sign in", &body)
}

pub fn dashboard(chrome: &Chrome<'_>, user: &User) -> Html<String> {
    let last_sign_in = user
        .last_sign_in_at
        .as_deref()
        .map(|at| format!("<p>Last sign-in: {}</p>", escape(at)))
        .unwrap_or_default();
    let body = format!(
        r#"<h1>Dashboard</h1>
<p>Signed in as {email}</p>
<p>User id: <code>{id}</code></p>
{last_sign_in}
<nav><a href="/dashboard/items">Your items</a> <a href="/dashboard/items/new">New item</a> <a href="/update-password">Change password</a></nav>"#,
        email = escape(user.email.as_deref().unwrap_or("")),
        id = escape(&user.id),
        last_sign_in = last_sign_in,
    );
    layout(chrome, "Dashboard", &body)
}

pub fn items(chrome: &Chrome<'_>, items: &[Item]) -> Html<String> {
    let rows: String = if items.is_empty() {
        "<p>No items yet.</p>".to_string()
    } else {
        let rows: String = items
            .iter()
            .map(|item| {
                format!(
                    r#"<li class="{class}">
<strong>{title}</strong>{description}
<small>{created}</small>
<form action="/dashboard/items" method="post"><input type="hidden" name="id" value="{id}"><input type="hidden" name="is_complete" value="{complete}"><button name="action" value="toggle">{toggle}</button><button name="action" value="delete">Delete</button></form>
</li>"#,
                    class = if item.is_complete { "done" } else { "open" },
                    title = escape(&item.title),
                    description = item
                        .description
                        .as_deref()
                        .map(|d| format!("<p>{}</p>", escape(d)))
                        .unwrap_or_default(),
                    created = item.created_at.format("%Y-%m-%d %H:%M"),
                    id = escape(&item.id),
                    complete = item.is_complete,
                    toggle = if item.is_complete { "Reopen" } else { "Complete" },
                )
            })
            .collect();
        format!("<ul>{}</ul>", rows)
    };
    layout(
        chrome,
        "Items",
        &format!(
            r#"<h1>Your items</h1><a href="/dashboard/items/new">New item</a>{}"#,
            rows
        ),
    )
}

/// Shown when the item list could not be loaded.
pub fn items_unavailable(chrome: &Chrome<'_>, message: &str) -> Html<String> {
    layout(
        chrome,
        "Items",
        &format!(
            r#"<h1>Your items</h1>{}<a href="/dashboard/items">Try again</a>"#,
            error_banner(Some(message))
        ),
    )
}

pub fn new_item(
    chrome: &Chrome<'_>,
    error: Option<&str>,
    title: &str,
    description: &str,
) -> Html<String> {
    let body = format!(
        r#"<h1>New item</h1>
{error}
<form action="/dashboard/items/new" method="post">
<label>Title <input name="title" value="{title}" minlength="3" maxlength="280" required></label>
<label>Description <textarea name="description" maxlength="1000">{description}</textarea></label>
<button type="submit">Create</button>
</form>"#,
        error = error_banner(error),
        title = escape(title),
        description = escape(description),
    );
    layout(chrome, "New item", &body)
}

pub fn reset_password(chrome: &Chrome<'_>) -> Html<String> {
    layout(
        chrome,
        "Reset password",
        r#"<h1>Reset password</h1>
<p>Enter your email and we will send you a link to choose a new password.</p>
<form action="/reset-password" method="post">
<label>Email <input type="email" name="email" required></label>
<button type="submit">Send reset link</button>
</form>
<p><a href="/login">Back to sign in</a></p>"#,
    )
}

pub fn update_password(chrome: &Chrome<'_>) -> Html<String> {
    layout(
        chrome,
        "Update password",
        r#"<h1>Choose a new password</h1>
<form action="/update-password" method="post">
<label>New password <input type="password" name="password" minlength="6" required></label>
<label>Confirm password <input type="password" name="confirm_password" minlength="6" required></label>
<button type="submit">Update password</button>
</form>"#,
    )
}

/// Bare page used by [`crate::Error`]'s response.
pub fn error_page(status: StatusCode, message: &str) -> Html<String> {
    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en"><head><meta charset="utf-8"><title>{status}</title></head>
<body><h1>{status}</h1><p>{message}</p><a href="/">Home</a></body></html>"#,
        status = status,
        message = escape(message),
    ))
}
