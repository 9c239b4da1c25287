use chrono::{DateTime, Local, Utc};
use plaza_types::{Comment, Post};

/// Short "how long ago" label for a timestamp
pub fn relative_time(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(then);

    if elapsed.num_minutes() < 1 {
        "Just now".to_string()
    } else if elapsed.num_hours() < 1 {
        format!("{}m", elapsed.num_minutes())
    } else if elapsed.num_days() < 1 {
        format!("{}h", elapsed.num_hours())
    } else if elapsed.num_days() < 7 {
        format!("{}d", elapsed.num_days())
    } else {
        then.format("%b %-d, %H:%M").to_string()
    }
}

/// Absolute timestamp in the viewer's local time
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local)
        .format("%Y-%m-%d %H:%M")
        .to_string()
}

pub fn render_post(post: &Post, now: DateTime<Utc>) -> String {
    let mut out = format!(
        "#{} {} · {} · {}\n{}\n",
        post.id,
        post.user.display_name(),
        relative_time(post.created_at, now),
        post.visibility().as_str(),
        post.content
    );
    if let Some(image) = &post.image_url {
        out.push_str(&format!("[image] {}\n", image));
    }
    out.push_str(&format!(
        "{} {} · {} comments",
        if post.is_liked { "♥" } else { "♡" },
        post.likes_count,
        post.comments_count
    ));
    out
}

pub fn render_comment(comment: &Comment, now: DateTime<Utc>) -> String {
    let indent = if comment.is_reply() { "    ↳ " } else { "" };
    let mut out = format!(
        "{}#{} {} · {}: {} ({} {}",
        indent,
        comment.id,
        comment.user.display_name(),
        relative_time(comment.created_at, now),
        comment.content,
        if comment.is_liked { "♥" } else { "♡" },
        comment.likes_count
    );
    if !comment.is_reply() && comment.replies_count > 0 {
        out.push_str(&format!(" · {} replies", comment.replies_count));
    }
    out.push(')');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_relative_time_buckets() {
        let now = base();
        assert_eq!(relative_time(now - Duration::seconds(30), now), "Just now");
        assert_eq!(relative_time(now - Duration::minutes(5), now), "5m");
        assert_eq!(relative_time(now - Duration::hours(3), now), "3h");
        assert_eq!(relative_time(now - Duration::days(2), now), "2d");
    }

    #[test]
    fn test_relative_time_old_dates() {
        let now = base();
        let then = Utc.with_ymd_and_hms(2024, 2, 1, 9, 30, 0).unwrap();
        assert_eq!(relative_time(then, now), "Feb 1, 09:30");
    }

    #[test]
    fn test_future_timestamp_is_just_now() {
        let now = base();
        assert_eq!(relative_time(now + Duration::minutes(2), now), "Just now");
    }
}
