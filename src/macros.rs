#[macro_export]
macro_rules! funcmap {
    ($($name:literal => $f:expr),* $(,)?) => {{
        let mut m = $crate::FuncMap::new();
        $(m.insert($name.to_string(), $crate::func($f));)*
        m
    }};
}

/// Implement [`Reflect`](crate::Reflect) for a user type from a field table
/// and a method table.
///
/// Fields map template names to struct fields (whose types convert into
/// [`Value`](crate::Value)); methods map template names to inherent methods
/// of the form `fn(&mut self, args: &[Value]) -> Value`.
///
/// ```ignore
/// reflect! {
///     Person in "hr" {
///         fields { Age => age, Position => position }
///         methods { SetAge => set_age }
///     }
/// }
/// ```
#[macro_export]
macro_rules! reflect {
    (
        $ty:ident in $pkg:literal {
            $(fields { $($fname:ident => $field:ident),* $(,)? })?
            $(methods { $($mname:ident => $method:ident),* $(,)? })?
        }
    ) => {
        impl $crate::Reflect for $ty {
            fn package_path(&self) -> &'static str {
                $pkg
            }

            fn type_name(&self) -> &'static str {
                stringify!($ty)
            }

            fn get(&self, field: &str) -> Option<$crate::Value> {
                match field {
                    $($(stringify!($fname) => Some($crate::Value::from(self.$field.clone())),)*)?
                    _ => None,
                }
            }

            fn call(
                &mut self,
                method: &str,
                args: &[$crate::Value],
            ) -> Result<$crate::Value, $crate::EvalError> {
                match method {
                    $($(stringify!($mname) => Ok(self.$method(args)),)*)?
                    _ => Err($crate::EvalError::NoSuchMethod {
                        type_name: stringify!($ty).to_string(),
                        method: method.to_string(),
                    }),
                }
            }
        }
    };
}
