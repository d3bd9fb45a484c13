//! UI string tables and theme palettes.
//!
//! Both are plain lookup tables selected by an enum; there is no runtime
//! resource loading. Missing translations fall back to English, and missing
//! keys fall back to the key itself.

use crate::error::{Error, ErrorKind};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    #[default]
    English,
    Spanish,
    French,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::English, Language::Spanish, Language::French];

    /// ISO 639-1 code.
    pub fn code(self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Spanish => "es",
            Language::French => "fr",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|lang| lang.code().eq_ignore_ascii_case(code))
    }

    fn table(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Language::English => EN,
            Language::Spanish => ES,
            Language::French => FR,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

const EN: &[(&str, &str)] = &[
    ("app.title", "Budget Tracker"),
    ("dashboard.title", "Dashboard"),
    ("dashboard.total_income", "Total income"),
    ("dashboard.total_spending", "Total spending"),
    ("dashboard.balance", "Balance"),
    ("income.title", "Income"),
    ("spending.title", "Spending"),
    ("categories.title", "Categories"),
    ("settings.title", "Settings"),
    ("settings.language", "Language"),
    ("settings.theme", "Theme"),
    ("action.add", "Add"),
    ("action.save", "Save"),
    ("action.delete", "Delete"),
    ("action.cancel", "Cancel"),
    ("error.validation", "Please check the highlighted fields."),
    ("error.not_found", "The item no longer exists."),
    ("error.conflict", "That change conflicts with existing data."),
    ("error.system", "Something went wrong. Please try again."),
    ("error.cancelled", "The operation was cancelled."),
];

const ES: &[(&str, &str)] = &[
    ("app.title", "Control de Presupuesto"),
    ("dashboard.title", "Resumen"),
    ("dashboard.total_income", "Ingresos totales"),
    ("dashboard.total_spending", "Gastos totales"),
    ("dashboard.balance", "Saldo"),
    ("income.title", "Ingresos"),
    ("spending.title", "Gastos"),
    ("categories.title", "Categorías"),
    ("settings.title", "Ajustes"),
    ("settings.language", "Idioma"),
    ("settings.theme", "Tema"),
    ("action.add", "Añadir"),
    ("action.save", "Guardar"),
    ("action.delete", "Eliminar"),
    ("action.cancel", "Cancelar"),
    ("error.validation", "Revise los campos marcados."),
    ("error.not_found", "El elemento ya no existe."),
    ("error.conflict", "El cambio entra en conflicto con los datos existentes."),
    ("error.system", "Algo salió mal. Inténtelo de nuevo."),
    ("error.cancelled", "La operación fue cancelada."),
];

const FR: &[(&str, &str)] = &[
    ("app.title", "Suivi de Budget"),
    ("dashboard.title", "Tableau de bord"),
    ("dashboard.total_income", "Revenus totaux"),
    ("dashboard.total_spending", "Dépenses totales"),
    ("dashboard.balance", "Solde"),
    ("income.title", "Revenus"),
    ("spending.title", "Dépenses"),
    ("categories.title", "Catégories"),
    ("settings.title", "Paramètres"),
    ("settings.language", "Langue"),
    ("settings.theme", "Thème"),
    ("action.add", "Ajouter"),
    ("action.save", "Enregistrer"),
    ("action.delete", "Supprimer"),
    ("action.cancel", "Annuler"),
    ("error.validation", "Veuillez vérifier les champs signalés."),
    ("error.not_found", "L'élément n'existe plus."),
    ("error.system", "Une erreur est survenue. Veuillez réessayer."),
];

fn lookup(table: &'static [(&'static str, &'static str)], key: &str) -> Option<&'static str> {
    table.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

/// String lookup for one language.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Localizer {
    language: Language,
}

impl Localizer {
    pub fn new(language: Language) -> Self {
        Localizer { language }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// Localized text for `key`.
    ///
    /// Falls back to English, then to `key` itself.
    pub fn get<'a>(&self, key: &'a str) -> &'a str {
        lookup(self.language.table(), key)
            .or_else(|| lookup(EN, key))
            .unwrap_or(key)
    }

    /// Whether `key` has a translation in this language (no fallback).
    pub fn has(&self, key: &str) -> bool {
        lookup(self.language.table(), key).is_some()
    }

    /// User-facing message for an error.
    ///
    /// Validation errors keep their own message; other kinds map to a
    /// generic localized sentence.
    pub fn error_message(&self, error: &Error) -> String {
        let key = match error.kind() {
            ErrorKind::Validation => return error.message().to_string(),
            ErrorKind::NotFound => "error.not_found",
            ErrorKind::Conflict => "error.conflict",
            ErrorKind::System => "error.system",
            ErrorKind::Cancellation => "error.cancelled",
        };
        self.get(key).to_string()
    }
}

// ============================================================================
// Themes
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

/// Colors a UI layer needs to render one theme, as `#RRGGBB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Palette {
    pub background: &'static str,
    pub surface: &'static str,
    pub text: &'static str,
    pub muted_text: &'static str,
    pub accent: &'static str,
    pub income: &'static str,
    pub spending: &'static str,
}

const LIGHT: Palette = Palette {
    background: "#FFFFFF",
    surface: "#F5F5F5",
    text: "#212121",
    muted_text: "#616161",
    accent: "#1976D2",
    income: "#2E7D32",
    spending: "#C62828",
};

const DARK: Palette = Palette {
    background: "#121212",
    surface: "#1E1E1E",
    text: "#EEEEEE",
    muted_text: "#9E9E9E",
    accent: "#90CAF9",
    income: "#81C784",
    spending: "#E57373",
};

impl Theme {
    pub fn palette(self) -> &'static Palette {
        match self {
            Theme::Light => &LIGHT,
            Theme::Dark => &DARK,
        }
    }

    pub fn toggled(self) -> Theme {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::codes;

    #[test]
    fn test_lookup_in_selected_language() {
        let es = Localizer::new(Language::Spanish);
        assert_eq!(es.get("dashboard.balance"), "Saldo");
        assert_eq!(Localizer::default().get("dashboard.balance"), "Balance");
    }

    #[test]
    fn test_missing_translation_falls_back_to_english() {
        let fr = Localizer::new(Language::French);
        assert!(!fr.has("error.cancelled"));
        assert_eq!(fr.get("error.cancelled"), "The operation was cancelled.");
    }

    #[test]
    fn test_unknown_key_returns_key() {
        assert_eq!(Localizer::default().get("no.such.key"), "no.such.key");
    }

    #[test]
    fn test_every_language_translates_titles() {
        for language in Language::ALL {
            let localizer = Localizer::new(language);
            assert!(localizer.has("app.title"), "{} lacks app.title", language);
        }
    }

    #[test]
    fn test_language_codes() {
        assert_eq!(Language::from_code("ES"), Some(Language::Spanish));
        assert_eq!(Language::from_code("de"), None);
    }

    #[test]
    fn test_error_message() {
        let es = Localizer::new(Language::Spanish);
        let missing = Error::not_found(codes::NOT_FOUND, "Income 4 not found");
        let invalid = Error::validation("INVALID_AMOUNT", "Amount must be greater than zero");

        assert_eq!(es.error_message(&missing), "El elemento ya no existe.");
        assert_eq!(es.error_message(&invalid), "Amount must be greater than zero");
    }

    #[test]
    fn test_theme_palettes_differ() {
        assert_ne!(Theme::Light.palette(), Theme::Dark.palette());
        assert_eq!(Theme::Light.toggled(), Theme::Dark);
    }
}
