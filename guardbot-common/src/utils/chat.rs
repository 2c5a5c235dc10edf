use teloxide::{
    prelude::{ChatId, Requester, UserId},
    types::ChatMemberKind,
};

use crate::tgbot::BotData;

/// Checks that `user_id` is an administrator or the owner of `chat_id`,
/// queried per invocation. A user always manages their own DM.
pub async fn check_admin_permission_in_chat(
    bot: &BotData,
    chat_id: ChatId,
    user_id: UserId,
) -> bool {
    if chat_id == ChatId(user_id.0 as i64) {
        return true;
    }
    let Ok(member) = bot.bot().get_chat_member(chat_id, user_id).await else {
        return false;
    };
    matches!(
        member.kind,
        ChatMemberKind::Owner(_) | ChatMemberKind::Administrator(_)
    )
}
