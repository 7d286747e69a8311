use estoque_core::Question;
use serde::Serialize;

/// Direct query used when the agent raises. Chosen by keyword, case-insensitively.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackQuery {
    BestSellers,
    InStock,
    Listing,
}

impl FallbackQuery {
    pub fn select(question: &Question) -> Self {
        let folded = question.folded();
        if folded.contains("vende mais") {
            Self::BestSellers
        } else if folded.contains("estoque") {
            Self::InStock
        } else {
            Self::Listing
        }
    }

    pub fn sql(self) -> &'static str {
        match self {
            Self::BestSellers => "SELECT * FROM produtos ORDER BY vendas DESC LIMIT 5",
            Self::InStock => "SELECT * FROM produtos WHERE quantidade > 0 LIMIT 10",
            Self::Listing => "SELECT * FROM produtos LIMIT 5",
        }
    }
}
