//! Item pages and actions

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use axum::Form;

use crate::forms::{ItemAction, ItemActionForm, NewItemForm};
use crate::handlers::shared::{Action, Page};
use crate::html;
use crate::items::{ItemPatch, Items};
use crate::notify::{Notification, Notifier, RecordingNotifier};
use crate::state::AppState;

const ITEMS_PATH: &str = "/dashboard/items";
const NEW_ITEM_PATH: &str = "/dashboard/items/new";

/// GET /dashboard/items
pub async fn list(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let mut page = Page::new(&state, &headers, ITEMS_PATH);
    let Some(user) = page.user().await else {
        return page.redirect(&state.policy.login_redirect(ITEMS_PATH));
    };

    let recorder = RecordingNotifier::new();
    let listed = Items::new(page.backend.as_ref(), &state.cache, &recorder)
        .list_for(&user)
        .await;
    page.toasts.extend(recorder.take());

    match listed {
        Ok(items) => page.render(html::items(&page.chrome(Some(&user)), &items)),
        Err(err) => page.render(html::items_unavailable(
            &page.chrome(Some(&user)),
            &err.user_message(),
        )),
    }
}

/// POST /dashboard/items: toggle or delete one item.
pub async fn act(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<ItemActionForm>,
) -> Response {
    let action = Action::new(&state, &headers);
    let items = Items::new(action.backend.as_ref(), &state.cache, &action.notifier);

    // Failures are already reported through the notifier.
    match form.validate() {
        Ok(ItemAction::SetComplete(is_complete)) => {
            let patch = ItemPatch {
                is_complete: Some(is_complete),
                ..Default::default()
            };
            let _ = items.update(&form.id, &patch).await;
        }
        Ok(ItemAction::Delete) => {
            let _ = items.delete(&form.id).await;
        }
        Err(err) => action
            .notifier
            .notify(Notification::error("Could not update item", err.to_string())),
    }

    action.see_other(ITEMS_PATH)
}

/// GET /dashboard/items/new
pub async fn new_page(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let page = Page::new(&state, &headers, NEW_ITEM_PATH);
    let Some(user) = page.user().await else {
        return page.redirect(&state.policy.login_redirect(NEW_ITEM_PATH));
    };
    page.render(html::new_item(&page.chrome(Some(&user)), None, "", ""))
}

/// POST /dashboard/items/new
///
/// Invalid or failed submissions re-render the form with the input kept.
pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<NewItemForm>,
) -> Response {
    let action = Action::new(&state, &headers);
    let description = form.description.clone().unwrap_or_default();

    let rerender = |page: Page, message: &str, status: StatusCode| {
        let body = html::new_item(&page.chrome(None), Some(message), &form.title, &description);
        let mut response = page.render(body);
        *response.status_mut() = status;
        action.respond(response)
    };

    let draft = match form.validate() {
        Ok(draft) => draft,
        Err(err) => {
            let page = Page::new(&state, &headers, NEW_ITEM_PATH);
            return rerender(page, &err.to_string(), StatusCode::UNPROCESSABLE_ENTITY);
        }
    };

    let items = Items::new(action.backend.as_ref(), &state.cache, &action.notifier);
    match items.create(&draft.title, draft.description.as_deref()).await {
        Ok(_) => action.see_other(ITEMS_PATH),
        Err(err) => {
            // The toast would only repeat the inline error.
            let _ = action.notifier.take();
            let page = Page::new(&state, &headers, NEW_ITEM_PATH);
            rerender(page, &err.user_message(), StatusCode::OK)
        }
    }
}

