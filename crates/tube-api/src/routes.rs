use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, patch, post},
};

use tube_types::api::HealthStatus;

use crate::middleware::{optional_auth, require_auth};
use crate::response::ApiResponse;
use crate::state::AppState;
use crate::{comments, dashboard, likes, playlists, subscriptions, tweets, users, videos};

/// Assemble every route family under `/api/v1`.
///
/// Each family is split into routes behind [`optional_auth`] (anonymous
/// callers allowed, `Viewer` in extensions) and routes behind
/// [`require_auth`] (`User` in extensions). The two halves share paths where
/// only the method differs, which `merge` combines into one method router.
pub fn api_router(state: AppState) -> Router {
    let optional = || from_fn_with_state(state.clone(), optional_auth);
    let required = || from_fn_with_state(state.clone(), require_auth);

    let users = Router::new()
        .route("/register", post(users::register))
        .route("/login", post(users::login))
        .route("/refresh-token", post(users::refresh_token))
        .merge(
            Router::new()
                .route("/c/{username}", get(users::channel_profile))
                .route_layer(optional()),
        )
        .merge(
            Router::new()
                .route("/logout", post(users::logout))
                .route("/change-password", post(users::change_password))
                .route("/current-user", get(users::current_user))
                .route("/update-account", patch(users::update_account))
                .route("/avatar", patch(users::update_avatar))
                .route("/cover-image", patch(users::update_cover_image))
                .route("/history", get(users::watch_history))
                .route_layer(required()),
        );

    let videos = Router::new()
        .merge(
            Router::new()
                .route("/", get(videos::list_videos))
                .route("/all/option", get(videos::search_videos))
                .route("/{videoId}", get(videos::get_video))
                .route("/view/{videoId}", patch(videos::record_view))
                .route_layer(optional()),
        )
        .merge(
            Router::new()
                .route("/", post(videos::publish_video))
                .route(
                    "/{videoId}",
                    patch(videos::update_video).delete(videos::delete_video),
                )
                .route("/toggle/publish/{videoId}", patch(videos::toggle_publish))
                .route_layer(required()),
        );

    let comments = Router::new()
        .merge(
            Router::new()
                .route("/get/{videoId}", get(comments::video_comments))
                .route_layer(optional()),
        )
        .merge(
            Router::new()
                .route("/add/{videoId}", post(comments::add_comment))
                .route(
                    "/{commentId}",
                    patch(comments::update_comment).delete(comments::delete_comment),
                )
                .route_layer(required()),
        );

    let tweets = Router::new()
        .merge(
            Router::new()
                .route("/", get(tweets::all_tweets))
                .route("/user/{userId}", get(tweets::user_tweets))
                .route_layer(optional()),
        )
        .merge(
            Router::new()
                .route("/", post(tweets::create_tweet))
                .route(
                    "/{tweetId}",
                    patch(tweets::update_tweet).delete(tweets::delete_tweet),
                )
                .route_layer(required()),
        );

    let likes = Router::new()
        .route("/toggle", post(likes::toggle))
        .route("/toggle/v/{videoId}", post(likes::toggle_video))
        .route("/toggle/c/{commentId}", post(likes::toggle_comment))
        .route("/toggle/t/{tweetId}", post(likes::toggle_tweet))
        .route("/videos", get(likes::liked_videos))
        .route_layer(required());

    let subscriptions = Router::new()
        .merge(
            Router::new()
                .route("/{channelId}", get(subscriptions::channel_subscribers))
                .route("/users/{subscriberId}", get(subscriptions::subscribed_channels))
                .route_layer(optional()),
        )
        .merge(
            Router::new()
                .route("/{channelId}", post(subscriptions::toggle_subscription))
                .route_layer(required()),
        );

    let playlists = Router::new()
        .route("/", post(playlists::create_playlist))
        .route(
            "/{playlistId}",
            get(playlists::get_playlist)
                .patch(playlists::update_playlist)
                .delete(playlists::delete_playlist),
        )
        .route("/add/{playlistId}/{videoId}", patch(playlists::add_video))
        .route("/remove/{playlistId}/{videoId}", patch(playlists::remove_video))
        .route("/users/{userId}", get(playlists::user_playlists))
        .route("/user/playlists/{videoId}", get(playlists::save_targets))
        .route_layer(required());

    let dashboard = Router::new()
        .route("/stats", get(dashboard::channel_stats))
        .route("/videos", get(dashboard::channel_videos))
        .route_layer(required());

    Router::new()
        .route("/api/v1/healthcheck", get(healthcheck))
        .nest("/api/v1/users", users)
        .nest("/api/v1/videos", videos)
        .nest("/api/v1/comment", comments)
        .nest("/api/v1/tweets", tweets)
        .nest("/api/v1/like", likes)
        .nest("/api/v1/subscription", subscriptions)
        .nest("/api/v1/playlist", playlists)
        .nest("/api/v1/dashboard", dashboard)
        .with_state(state)
}

async fn healthcheck() -> ApiResponse<HealthStatus> {
    ApiResponse::ok(HealthStatus { status: "OK" }, "Health check passed")
}
