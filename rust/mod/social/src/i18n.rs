//! User-facing messages.
//!
//! Every message the service puts into a `ServiceError` goes through a
//! `Localizer`. Catalogs exist for English and Spanish; a key missing
//! from the Spanish catalog falls back to English, an unknown key comes
//! back unchanged.

/// Translates message keys to localized strings.
pub trait Localizer: Send + Sync + 'static {
    /// `key` is a dot-separated identifier such as "error.comment.empty".
    /// `args` are named substitutions: [("max", "140")] fills `{max}`.
    fn t(&self, key: &str, args: &[(&str, &str)]) -> String;
}

/// Supported catalog languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lang {
    #[default]
    En,
    Es,
}

impl Lang {
    /// Match a language tag ("es", "es-MX", "EN"); anything unknown is English.
    pub fn from_tag(tag: &str) -> Self {
        let primary = tag.split(['-', '_']).next().unwrap_or_default();
        if primary.eq_ignore_ascii_case("es") {
            Lang::Es
        } else {
            Lang::En
        }
    }
}

/// Built-in catalogs.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultLocalizer {
    lang: Lang,
}

impl DefaultLocalizer {
    pub fn new(lang: Lang) -> Self {
        Self { lang }
    }

    pub fn for_tag(tag: &str) -> Self {
        Self::new(Lang::from_tag(tag))
    }
}

fn english(key: &str) -> Option<&'static str> {
    Some(match key {
        // Registration and profile
        "error.user.username_empty" => "Username cannot be empty",
        "error.user.username_too_long" => "Username exceeds {max} characters",
        "error.user.username_taken" => "Please use a different username.",
        "error.user.email_invalid" => "Invalid email address",
        "error.user.email_too_long" => "Email address exceeds {max} characters",
        "error.user.email_taken" => "Please use a different email address.",
        "error.user.not_found" => "User {username} not found.",
        "error.user.id_not_found" => "User {id} not found.",
        "error.profile.about_too_long" => "About me exceeds {max} characters",

        // Auth
        "error.auth.invalid_credentials" => "Invalid username or password",
        "error.auth.invalid_token" => "Invalid or expired token",
        "error.password.empty" => "Password cannot be empty",

        // Comments
        "error.comment.empty" => "Comment cannot be empty",
        "error.comment.too_long" => "Comment exceeds {max} characters",
        "error.comment.not_found" => "Comment {id} not found",
        "error.comment.not_author" => "You can only delete your own comments",

        // Follow
        "error.follow.self" => "You cannot follow yourself!",
        "error.unfollow.self" => "You cannot unfollow yourself!",

        _ => return None,
    })
}

fn spanish(key: &str) -> Option<&'static str> {
    Some(match key {
        "error.user.username_empty" => "El nombre de usuario no puede estar vacío",
        "error.user.username_too_long" => "El nombre de usuario supera los {max} caracteres",
        "error.user.username_taken" => "Por favor, usa un nombre de usuario diferente.",
        "error.user.email_invalid" => "Dirección de correo no válida",
        "error.user.email_too_long" => "La dirección de correo supera los {max} caracteres",
        "error.user.email_taken" => "Por favor, usa una dirección de correo diferente.",
        "error.user.not_found" => "Usuario {username} no encontrado.",
        "error.user.id_not_found" => "Usuario {id} no encontrado.",
        "error.profile.about_too_long" => "\"Acerca de mí\" supera los {max} caracteres",

        "error.auth.invalid_credentials" => "Nombre de usuario o contraseña no válidos",
        "error.auth.invalid_token" => "Token no válido o caducado",
        "error.password.empty" => "La contraseña no puede estar vacía",

        "error.comment.empty" => "El comentario no puede estar vacío",
        "error.comment.too_long" => "El comentario supera los {max} caracteres",
        "error.comment.not_found" => "Comentario {id} no encontrado",
        "error.comment.not_author" => "Solo puedes borrar tus propios comentarios",

        "error.follow.self" => "¡No puedes seguirte a ti mismo!",
        "error.unfollow.self" => "¡No puedes dejar de seguirte a ti mismo!",

        _ => return None,
    })
}

impl Localizer for DefaultLocalizer {
    fn t(&self, key: &str, args: &[(&str, &str)]) -> String {
        let text = match self.lang {
            Lang::Es => spanish(key).or_else(|| english(key)),
            Lang::En => english(key),
        };
        let Some(text) = text else {
            return key.to_string();
        };

        let mut result = text.to_string();
        for (name, value) in args {
            result = result.replace(&format!("{{{}}}", name), value);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn english_with_args() {
        let l = DefaultLocalizer::default();
        assert_eq!(
            l.t("error.comment.too_long", &[("max", "140")]),
            "Comment exceeds 140 characters"
        );
    }

    #[test]
    fn spanish_catalog() {
        let l = DefaultLocalizer::for_tag("es-MX");
        assert_eq!(
            l.t("error.user.not_found", &[("username", "susan")]),
            "Usuario susan no encontrado."
        );
    }

    #[test]
    fn unknown_language_is_english() {
        let l = DefaultLocalizer::for_tag("fr");
        assert_eq!(l.t("error.follow.self", &[]), "You cannot follow yourself!");
    }

    #[test]
    fn unknown_key_returns_key() {
        let l = DefaultLocalizer::for_tag("es");
        assert_eq!(l.t("some.unknown.key", &[]), "some.unknown.key");
    }
}
