//! Product-id markers and the product carousel.

use crate::clients::{CarouselButton, CarouselCard, LeadsClient, MessagingClient, MessagingError, Product};

/// Cards per carousel; extra ids are ignored.
pub const MAX_CAROUSEL_CARDS: usize = 5;

pub const CAROUSEL_CAPTION: &str = "Encante-se com os destaques!";

const MARKER_KEY: &str = "ID_P";

/// Parse a `ID_P: <id>[, <id>...]` line.
///
/// The key is compared case-sensitively, so callers upper-case first. Returns None when the line is
/// not a marker, and an empty list for a marker without ids (`"ID_P:"`). Ids keep their order;
/// empty entries are dropped.
pub fn parse_product_ids(s: &str) -> Option<Vec<String>> {
    let (key, rest) = s.trim().split_once(':')?;
    if key.trim() != MARKER_KEY {
        return None;
    }
    Some(
        rest.split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

/// Ids of the first line of `text` (upper-cased) that is a marker with at least one id.
pub fn find_product_marker(text: &str) -> Option<Vec<String>> {
    text.to_uppercase()
        .lines()
        .filter_map(parse_product_ids)
        .find(|ids| !ids.is_empty())
}

/// `<base>?id=<id>&id_empresa=1`
pub fn product_image_url(base: &str, id: &str) -> String {
    format!("{}?id={}&id_empresa=1", base, id)
}

/// Card for one product: lower-cased description and price, catalog image, one reply button.
pub fn build_card(product: &Product, id: &str, image_base: &str) -> CarouselCard {
    CarouselCard {
        text: format!(
            "{}\nPreço: R$ {}",
            product.description.to_lowercase(),
            product.price_label()
        ),
        image: product_image_url(image_base, id),
        buttons: vec![CarouselButton::reply(format!("Vou querer o {}", product.name))],
    }
}

/// Look up the first [`MAX_CAROUSEL_CARDS`] ids and send them as one carousel.
/// Failed or empty lookups are skipped; nothing is sent when no card remains.
/// Returns the number of cards sent.
pub async fn send_products_carousel(
    leads: &LeadsClient,
    messaging: &MessagingClient,
    image_base: &str,
    tax_id: &str,
    number: &str,
    ids: &[String],
) -> Result<usize, MessagingError> {
    let mut cards = Vec::new();
    for id in ids.iter().take(MAX_CAROUSEL_CARDS) {
        match leads.products(tax_id, Some(id)).await {
            Ok(products) => match products.first() {
                Some(product) => cards.push(build_card(product, id, image_base)),
                None => log::debug!("carousel: no product for id {}", id),
            },
            Err(e) => log::warn!("carousel: product {} lookup failed: {}", id, e),
        }
    }
    if cards.is_empty() {
        log::info!("carousel: no products found, nothing sent");
        return Ok(0);
    }
    messaging.send_carousel(number, CAROUSEL_CAPTION, &cards).await?;
    Ok(cards.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ids(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_marker_lines() {
        assert_eq!(parse_product_ids("ID_P: 1, 2 ,3"), Some(ids(&["1", "2", "3"])));
        assert_eq!(parse_product_ids("  ID_P :42  "), Some(ids(&["42"])));
        assert_eq!(parse_product_ids("ID_P: 1,,2,"), Some(ids(&["1", "2"])));
        assert_eq!(parse_product_ids("ID_P:"), Some(vec![]));
    }

    #[test]
    fn rejects_non_markers() {
        assert_eq!(parse_product_ids("ID_P 1, 2"), None);
        assert_eq!(parse_product_ids("id_p: 1"), None);
        assert_eq!(parse_product_ids("Produto: 1"), None);
        assert_eq!(parse_product_ids(""), None);
    }

    #[test]
    fn finds_marker_on_any_line_case_insensitively() {
        assert_eq!(find_product_marker("id_p: 10"), Some(ids(&["10"])));
        assert_eq!(
            find_product_marker("Veja estes:\nID_P: 7, 8\nGostou?"),
            Some(ids(&["7", "8"]))
        );
        assert_eq!(find_product_marker("ID_P:\nsem ids"), None);
        assert_eq!(find_product_marker("Quero ver produtos"), None);
    }

    #[test]
    fn card_text_image_and_button() {
        let product = Product::from_value(&json!({
            "nome": "Anel Solitário",
            "descricao": "Anel em PRATA 925",
            "preco": 129.9
        }))
        .unwrap();
        let card = build_card(&product, "10", "http://img.test/produtos/imagem");
        assert_eq!(card.text, "anel em prata 925\nPreço: R$ 129.9");
        assert_eq!(card.image, "http://img.test/produtos/imagem?id=10&id_empresa=1");
        assert_eq!(card.buttons, vec![CarouselButton::reply("Vou querer o Anel Solitário")]);
    }

    #[tokio::test]
    async fn all_lookups_failing_sends_nothing() {
        let mut leads_server = mockito::Server::new_async().await;
        let _m = leads_server
            .mock("GET", mockito::Matcher::Regex("^/produtos".to_string()))
            .with_status(500)
            .expect(2)
            .create_async()
            .await;
        let mut whats_server = mockito::Server::new_async().await;
        let carousel = whats_server
            .mock("POST", "/send/carousel")
            .expect(0)
            .create_async()
            .await;

        let leads = LeadsClient::new(&leads_server.url(), "");
        let whats = MessagingClient::new(&whats_server.url(), "t");
        let sent = send_products_carousel(&leads, &whats, "http://img", "1", "55", &ids(&["1", "2"]))
            .await
            .unwrap();
        assert_eq!(sent, 0);
        carousel.assert_async().await;
    }

    #[tokio::test]
    async fn only_first_five_ids_are_looked_up() {
        let mut leads_server = mockito::Server::new_async().await;
        let lookups = leads_server
            .mock("GET", mockito::Matcher::Regex("^/produtos".to_string()))
            .with_status(200)
            .with_body(r#"[{"nome":"Brinco","descricao":"Ouro","preco":"99,90"}]"#)
            .expect(5)
            .create_async()
            .await;
        let mut whats_server = mockito::Server::new_async().await;
        let carousel = whats_server
            .mock("POST", "/send/carousel")
            .match_body(mockito::Matcher::PartialJson(json!({
                "number": "55",
                "text": CAROUSEL_CAPTION
            })))
            .with_status(200)
            .create_async()
            .await;

        let leads = LeadsClient::new(&leads_server.url(), "");
        let whats = MessagingClient::new(&whats_server.url(), "t");
        let all = ids(&["1", "2", "3", "4", "5", "6", "7"]);
        let sent = send_products_carousel(&leads, &whats, "http://img", "1", "55", &all)
            .await
            .unwrap();
        assert_eq!(sent, 5);
        lookups.assert_async().await;
        carousel.assert_async().await;
    }
}
