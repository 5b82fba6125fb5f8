//! Email templates for invite delivery.

/// Content for invite emails.
pub struct InviteEmailContent {
    pub subject: String,
    pub text: String,
    pub html: String,
}

impl InviteEmailContent {
    /// Create invite email content with the given join link.
    pub fn new(invite_url: &str) -> Self {
        Self {
            subject: "You have been invited to the Accred platform".to_string(),
            text: Self::text_template(invite_url),
            html: Self::html_template(invite_url),
        }
    }

    fn text_template(invite_url: &str) -> String {
        format!(
            r#"You have been invited to the Accred platform.

Open the link below to view and accept your invitation:

{}

The invitation expires 7 days after it was issued.

If you weren't expecting this invitation, you can ignore this email.

--
Accred Platform"#,
            invite_url
        )
    }

    fn html_template(invite_url: &str) -> String {
        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <style>
        body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Oxygen, Ubuntu, sans-serif; line-height: 1.6; color: #333; margin: 0; padding: 0; background: #f5f5f5; }}
        .container {{ max-width: 600px; margin: 0 auto; padding: 40px 20px; }}
        .card {{ background: white; border-radius: 8px; padding: 40px; box-shadow: 0 2px 4px rgba(0,0,0,0.1); }}
        h1 {{ color: #1a1a1a; margin-top: 0; font-size: 24px; }}
        .button {{ display: inline-block; padding: 14px 28px; background: #2563eb; color: #fff; border-radius: 6px; text-decoration: none; font-weight: bold; margin: 24px 0; }}
        .expires {{ color: #666; font-size: 14px; }}
        .footer {{ margin-top: 32px; padding-top: 20px; border-top: 1px solid #eee; color: #888; font-size: 12px; }}
    </style>
</head>
<body>
    <div class="container">
        <div class="card">
            <h1>You have been invited</h1>
            <p>Open your invitation to view the details and accept:</p>
            <p><a class="button" href="{0}">View invitation</a></p>
            <p class="expires">The invitation expires 7 days after it was issued.</p>
            <div class="footer">
                <p>If you weren't expecting this invitation, you can ignore this email.</p>
                <p>Accred Platform</p>
            </div>
        </div>
    </div>
</body>
</html>"#,
            invite_url
        )
    }
}
