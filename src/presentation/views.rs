use crate::application::error::{ErrorReport, HttpError};
use crate::application::feed::AuthorPanel;
use crate::application::pagination::Page;
use crate::domain::entities::{CommentRecord, GroupRecord, PostRecord};
use crate::domain::posts::{FieldErrors, format_human_date, format_iso};
use crate::domain::viewer::Viewer;
use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;

const SITE_NAME: &str = "Yatube";
const PAGE_WINDOW: u64 = 2;

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    template.render().map(Html).map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
        .into()
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

/// Error page without viewer-specific chrome. A failure to render it falls
/// back to a plain-text body so that error handling cannot recurse.
pub fn render_error_page(status: StatusCode, message: &str) -> Response {
    let view = LayoutContext::new(
        LayoutChrome::new(status_title(status), None),
        ErrorPageView {
            status: status.as_u16(),
            title: status_title(status).to_string(),
            message: message.to_string(),
        },
    );
    match (ErrorTemplate { view }).render() {
        Ok(html) => (status, Html(html)).into_response(),
        Err(_) => (status, message.to_string()).into_response(),
    }
}

pub fn render_not_found_response() -> Response {
    let mut response = render_error_page(
        StatusCode::NOT_FOUND,
        "The page you requested does not exist.",
    );
    ErrorReport::from_message(
        "presentation::views::render_not_found_response",
        StatusCode::NOT_FOUND,
        "Resource not found",
    )
    .attach(&mut response);
    response
}

fn status_title(status: StatusCode) -> &'static str {
    match status {
        StatusCode::NOT_FOUND => "Page not found",
        StatusCode::FORBIDDEN => "Forbidden",
        StatusCode::BAD_REQUEST => "Bad request",
        StatusCode::PAYLOAD_TOO_LARGE => "Upload too large",
        StatusCode::SERVICE_UNAVAILABLE => "Service unavailable",
        _ => "Something went wrong",
    }
}

#[derive(Clone)]
pub struct LayoutChrome {
    pub site_name: &'static str,
    pub title: String,
    pub viewer: Option<String>,
}

impl LayoutChrome {
    pub fn new(title: impl Into<String>, viewer: Option<&Viewer>) -> Self {
        Self {
            site_name: SITE_NAME,
            title: title.into(),
            viewer: viewer.map(|viewer| viewer.username.clone()),
        }
    }
}

#[derive(Clone)]
pub struct LayoutContext<T> {
    pub site_name: &'static str,
    pub title: String,
    pub viewer: Option<String>,
    pub content: T,
}

impl<T> LayoutContext<T> {
    pub fn new(chrome: LayoutChrome, content: T) -> Self {
        Self {
            site_name: chrome.site_name,
            title: chrome.title,
            viewer: chrome.viewer,
            content,
        }
    }
}

#[derive(Clone)]
pub struct GroupLink {
    pub title: String,
    pub href: String,
}

#[derive(Clone)]
pub struct PostCard {
    pub id: i64,
    pub href: String,
    pub text: String,
    pub author: String,
    pub author_href: String,
    pub published: String,
    pub iso_date: String,
    pub group: Option<GroupLink>,
    pub image_url: Option<String>,
}

impl From<&PostRecord> for PostCard {
    fn from(post: &PostRecord) -> Self {
        Self {
            id: post.id,
            href: post.canonical_path(),
            text: post.text.clone(),
            author: post.author_username.clone(),
            author_href: profile_path(&post.author_username),
            published: format_human_date(post.pub_date),
            iso_date: format_iso(post.pub_date),
            group: post.group.as_ref().map(|group| GroupLink {
                title: group.title.clone(),
                href: group_path(&group.slug),
            }),
            image_url: post.image.as_deref().map(media_url),
        }
    }
}

pub fn profile_path(username: &str) -> String {
    format!("/{username}/")
}

pub fn group_path(slug: &str) -> String {
    format!("/group/{slug}/")
}

pub fn media_url(stored_path: &str) -> String {
    format!("/media/{stored_path}")
}

#[derive(Clone)]
pub struct PageLink {
    pub number: u64,
    pub href: String,
    pub is_current: bool,
}

#[derive(Clone)]
pub struct PaginatorView {
    pub number: u64,
    pub num_pages: u64,
    pub total_count: u64,
    pub previous_href: Option<String>,
    pub next_href: Option<String>,
    pub links: Vec<PageLink>,
}

impl PaginatorView {
    pub fn new<T>(page: &Page<T>, base_path: &str) -> Self {
        let href = |number: u64| format!("{base_path}?page={number}");
        let first = page.number.saturating_sub(PAGE_WINDOW).max(1);
        let last = (page.number + PAGE_WINDOW).min(page.num_pages);

        Self {
            number: page.number,
            num_pages: page.num_pages,
            total_count: page.total_count,
            previous_href: page.previous_page_number().map(href),
            next_href: page.next_page_number().map(href),
            links: (first..=last)
                .map(|number| PageLink {
                    number,
                    href: href(number),
                    is_current: number == page.number,
                })
                .collect(),
        }
    }

    pub fn is_paginated(&self) -> bool {
        self.num_pages > 1
    }
}

#[derive(Clone)]
pub struct FeedView {
    pub posts: Vec<PostCard>,
    pub paginator: PaginatorView,
    pub empty_message: &'static str,
}

impl FeedView {
    pub fn new(page: &Page<PostRecord>, base_path: &str, empty_message: &'static str) -> Self {
        Self {
            posts: page.items.iter().map(PostCard::from).collect(),
            paginator: PaginatorView::new(page, base_path),
            empty_message,
        }
    }
}

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub view: LayoutContext<FeedView>,
}

#[derive(Template)]
#[template(path = "follow.html")]
pub struct FollowTemplate {
    pub view: LayoutContext<FeedView>,
}

pub struct GroupView {
    pub title: String,
    pub description: String,
    pub feed: FeedView,
}

impl GroupView {
    pub fn new(group: &GroupRecord, page: &Page<PostRecord>) -> Self {
        Self {
            title: group.title.clone(),
            description: group.description.clone(),
            feed: FeedView::new(page, &group_path(&group.slug), "No posts in this group yet."),
        }
    }
}

#[derive(Template)]
#[template(path = "group.html")]
pub struct GroupTemplate {
    pub view: LayoutContext<GroupView>,
}

#[derive(Clone)]
pub struct AuthorPanelView {
    pub username: String,
    pub shown_name: String,
    pub href: String,
    pub post_count: u64,
    pub followers: u64,
    pub following_count: u64,
    /// Follow controls are shown to signed-in viewers looking at someone else.
    pub show_follow_controls: bool,
    pub following: bool,
    pub follow_href: String,
    pub unfollow_href: String,
}

impl AuthorPanelView {
    pub fn new(panel: &AuthorPanel, viewer: Option<&Viewer>) -> Self {
        let username = panel.author.username.clone();
        Self {
            shown_name: panel.author.shown_name().to_string(),
            href: profile_path(&username),
            post_count: panel.post_count,
            followers: panel.followers,
            following_count: panel.following_count,
            show_follow_controls: viewer.is_some() && !panel.is_self,
            following: panel.following,
            follow_href: format!("/{username}/follow/"),
            unfollow_href: format!("/{username}/unfollow/"),
            username,
        }
    }
}

pub struct ProfileView {
    pub author: AuthorPanelView,
    pub feed: FeedView,
}

#[derive(Template)]
#[template(path = "profile.html")]
pub struct ProfileTemplate {
    pub view: LayoutContext<ProfileView>,
}

#[derive(Clone)]
pub struct CommentView {
    pub author: String,
    pub author_href: String,
    pub text: String,
    pub created: String,
}

impl From<&CommentRecord> for CommentView {
    fn from(comment: &CommentRecord) -> Self {
        Self {
            author: comment.author_username.clone(),
            author_href: profile_path(&comment.author_username),
            text: comment.text.clone(),
            created: format_human_date(comment.created),
        }
    }
}

#[derive(Clone)]
pub struct CommentFormView {
    pub action: String,
    pub text: String,
    pub errors: Vec<String>,
}

impl CommentFormView {
    pub fn blank(post_path: &str) -> Self {
        Self {
            action: format!("{post_path}comment/"),
            text: String::new(),
            errors: Vec::new(),
        }
    }

    pub fn rejected(post_path: &str, text: &str, errors: &FieldErrors) -> Self {
        Self {
            action: format!("{post_path}comment/"),
            text: text.to_string(),
            errors: errors.for_field("text"),
        }
    }
}

pub struct PostDetailView {
    pub post: PostCard,
    pub author: AuthorPanelView,
    pub comments: Vec<CommentView>,
    pub can_edit: bool,
    pub edit_href: String,
    /// Present only for signed-in viewers.
    pub comment_form: Option<CommentFormView>,
}

#[derive(Template)]
#[template(path = "post.html")]
pub struct PostTemplate {
    pub view: LayoutContext<PostDetailView>,
}

#[derive(Clone)]
pub struct GroupOption {
    pub id: i64,
    pub title: String,
    pub selected: bool,
}

pub struct PostFormView {
    pub heading: &'static str,
    pub submit_label: &'static str,
    pub action: String,
    pub is_edit: bool,
    pub text: String,
    pub groups: Vec<GroupOption>,
    pub current_image: Option<String>,
    pub text_errors: Vec<String>,
    pub group_errors: Vec<String>,
    pub image_errors: Vec<String>,
}

impl PostFormView {
    pub fn create(text: &str, selected_group: &str, groups: &[GroupRecord]) -> Self {
        Self {
            heading: "New post",
            submit_label: "Publish",
            action: "/new/".to_string(),
            is_edit: false,
            text: text.to_string(),
            groups: group_options(groups, selected_group),
            current_image: None,
            text_errors: Vec::new(),
            group_errors: Vec::new(),
            image_errors: Vec::new(),
        }
    }

    pub fn edit(post: &PostRecord, text: &str, selected_group: &str, groups: &[GroupRecord]) -> Self {
        Self {
            heading: "Edit post",
            submit_label: "Save",
            action: format!("{}edit/", post.canonical_path()),
            is_edit: true,
            text: text.to_string(),
            groups: group_options(groups, selected_group),
            current_image: post.image.as_deref().map(media_url),
            text_errors: Vec::new(),
            group_errors: Vec::new(),
            image_errors: Vec::new(),
        }
    }

    pub fn with_errors(self, errors: &FieldErrors) -> Self {
        Self {
            text_errors: errors.for_field("text"),
            group_errors: errors.for_field("group"),
            image_errors: errors.for_field("image"),
            ..self
        }
    }
}

fn group_options(groups: &[GroupRecord], selected: &str) -> Vec<GroupOption> {
    let selected = selected.trim();
    groups
        .iter()
        .map(|group| GroupOption {
            id: group.id,
            title: group.title.clone(),
            selected: group.id.to_string() == selected,
        })
        .collect()
}

#[derive(Template)]
#[template(path = "post_form.html")]
pub struct PostFormTemplate {
    pub view: LayoutContext<PostFormView>,
}

pub struct LoginView {
    pub next: String,
    pub error: Option<String>,
}

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub view: LayoutContext<LoginView>,
}

#[derive(Template)]
#[template(path = "about_author.html")]
pub struct AboutAuthorTemplate {
    pub view: LayoutContext<()>,
}

#[derive(Template)]
#[template(path = "about_tech.html")]
pub struct AboutTechTemplate {
    pub view: LayoutContext<()>,
}

pub struct ErrorPageView {
    pub status: u16,
    pub title: String,
    pub message: String,
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    pub view: LayoutContext<ErrorPageView>,
}
