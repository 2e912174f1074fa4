/// Creates a `String` from anything that a `String`
/// can be created from.
///
/// # Examples
/// ```
/// use kaniko_plugin_utils::string;
///
/// let tag = string!("latest");
/// assert_eq!(tag, String::from("latest"));
/// ```
#[macro_export]
macro_rules! string {
    ($str:expr) => {
        String::from($str)
    };
}

/// Creates a `Vec<String>` from a list of values
/// that can each be turned into a `String`.
///
/// # Examples
/// ```
/// use kaniko_plugin_utils::string_vec;
///
/// let tags = string_vec!["1", "1.2", format!("1.2.{}", 3)];
/// assert_eq!(tags, vec!["1", "1.2", "1.2.3"]);
/// ```
#[macro_export]
macro_rules! string_vec {
    ($($string:expr),* $(,)?) => {
        {
            vec![
                $($crate::string!($string),)*
            ]
        }
    };
}
