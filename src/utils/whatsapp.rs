use crate::entities::{Currency, PaymentMethod};

/// `https://wa.me/{number}?text=...`，文本按 URI 组件编码
pub fn whatsapp_link(number: &str, text: &str) -> String {
    let digits: String = number.chars().filter(|c| c.is_ascii_digit()).collect();
    let encoded = url::form_urlencoded::byte_serialize(text.as_bytes())
        .collect::<String>()
        .replace('+', "%20");
    format!("https://wa.me/{digits}?text={encoded}")
}

pub fn order_message(service: &str, plan: Option<&str>) -> String {
    match plan {
        Some(plan) if !plan.trim().is_empty() => {
            format!("Hi! I want to order {} ({}).", service.trim(), plan.trim())
        }
        _ => format!("Hi! I want to order {}.", service.trim()),
    }
}

pub fn deposit_message(
    transaction_id: i64,
    amount_minor: i64,
    currency: Currency,
    method: PaymentMethod,
) -> String {
    format!(
        "Hi! I submitted a deposit of {} {}.{:02} via {} (transaction #{}). Please confirm my payment.",
        currency,
        amount_minor / 100,
        amount_minor % 100,
        method,
        transaction_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whatsapp_link_encodes_text() {
        let link = whatsapp_link("+92 300 1234567", "Hi! ChatGPT Plus (1 month)");
        assert_eq!(
            link,
            "https://wa.me/923001234567?text=Hi%21%20ChatGPT%20Plus%20%281%20month%29"
        );
    }

    #[test]
    fn test_order_message() {
        assert_eq!(
            order_message("YouTube Growth", Some("Starter")),
            "Hi! I want to order YouTube Growth (Starter)."
        );
        assert_eq!(order_message("Web Development", None), "Hi! I want to order Web Development.");
        assert_eq!(order_message("Web Development", Some(" ")), "Hi! I want to order Web Development.");
    }

    #[test]
    fn test_deposit_message() {
        let msg = deposit_message(7, 250050, Currency::Pkr, PaymentMethod::JazzCash);
        assert_eq!(
            msg,
            "Hi! I submitted a deposit of PKR 2500.50 via JazzCash (transaction #7). Please confirm my payment."
        );
    }
}
