pub mod conversations;
pub mod files;
pub mod messages;
pub mod pins;
pub mod reactions;
pub mod users;

use actix_web::web;

use crate::chat::session;

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    // ── Realtime socket (token in the query string) ──
    cfg.route("/ws", web::get().to(session::ws_connect));

    // ── Conversation routes (bearer token required) ──
    cfg.service(
        web::scope("/conversations")
            .route("", web::get().to(conversations::list_accepted))
            .route("/pending", web::get().to(conversations::list_pending))
            .route("/direct", web::post().to(conversations::create_direct))
            .route("/group", web::post().to(conversations::create_group))
            .route("/{id}", web::get().to(conversations::get_conversation))
            .route("/{id}/accept", web::post().to(conversations::accept))
            .route("/{id}/reject", web::post().to(conversations::reject))
            .route("/{id}/messages", web::get().to(messages::get_messages))
            .route("/{id}/pinned", web::get().to(pins::get_pins))
            .route("/{id}/pinned", web::post().to(pins::pin_message))
            .route("/{id}/pinned", web::delete().to(pins::unpin_message))
            .route("/{id}/pin/{message_id}", web::post().to(pins::pin_by_path))
            .route("/{id}/unpin/{message_id}", web::post().to(pins::unpin_by_path))
            .route("/{id}/unpin/{message_id}", web::delete().to(pins::unpin_by_path)),
    );

    // ── Message routes ──
    cfg.service(
        web::scope("/messages")
            .route("/{id}", web::patch().to(messages::edit_message))
            .route("/{id}", web::delete().to(messages::delete_message))
            .route("/{id}/reactions", web::get().to(reactions::get_reactions))
            .route("/{id}/reactions", web::post().to(reactions::add_reaction))
            .route("/{id}/reactions/{emoji}", web::delete().to(reactions::remove_reaction)),
    );

    cfg.route("/files", web::post().to(files::upload_file));
    cfg.route("/users/lookup", web::get().to(users::lookup_user));
}
