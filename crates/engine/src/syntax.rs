/// Stylesheet syntaxes that need a dedicated postcss parser.
///
/// Plain CSS is not listed: it uses postcss's default grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Syntax {
    Less,
    Scss,
    Sass,
    SassIndented,
    Stylus,
}

impl Syntax {
    /// npm module providing the postcss syntax.
    #[must_use]
    pub const fn module_name(self) -> &'static str {
        match self {
            Self::Less => "postcss-less",
            Self::Scss => "postcss-scss",
            Self::Sass => "postcss-sass",
            Self::SassIndented => "sugarss",
            Self::Stylus => "postcss-styl",
        }
    }
}

/// Select the syntax for a document language identifier.
///
/// `None` means the default CSS grammar, both for `css` and for anything
/// unrecognized.
#[must_use]
pub fn syntax_for(language_id: &str) -> Option<Syntax> {
    match language_id {
        "less" => Some(Syntax::Less),
        "scss" => Some(Syntax::Scss),
        "sass" => Some(Syntax::Sass),
        "sass-indented" => Some(Syntax::SassIndented),
        "stylus" => Some(Syntax::Stylus),
        _ => None,
    }
}
