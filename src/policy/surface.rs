//! Versioned table of the reference library surface visible to compiled code.
//!
//! Bulk policy generation and explicit-rule validation both run against this
//! table instead of live runtime metadata. Bump [`SURFACE_VERSION`] whenever
//! the table changes so policy drift shows up in review.

/// Version of the bundled reference surface.
pub const SURFACE_VERSION: &str = "netstandard2.0+fsharp4.5+codelab1";

/// Kind of an exported type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    /// Reference type.
    Class,
    /// Value type.
    Struct,
    /// Enumeration.
    Enum,
    /// Interface.
    Interface,
}

/// A public property with its type (full name).
#[derive(Debug, Clone, Copy)]
pub struct PropertyEntry {
    /// Property name.
    pub name: &'static str,
    /// Full name of the property type.
    pub ty: &'static str,
}

/// A public method with its return type (full name).
#[derive(Debug, Clone, Copy)]
pub struct MethodEntry {
    /// Method name; overloads share one entry.
    pub name: &'static str,
    /// Full name of the return type.
    pub returns: &'static str,
}

/// One exported type.
#[derive(Debug, Clone, Copy)]
pub struct TypeEntry {
    /// Namespace, empty for the global namespace.
    pub namespace: &'static str,
    /// Type name (`+` for nesting, backtick arity for generics).
    pub name: &'static str,
    /// Type kind.
    pub kind: TypeKind,
    /// Full name of the base type, when it is part of the surface.
    pub base: Option<&'static str>,
    /// Declared public properties.
    pub properties: &'static [PropertyEntry],
    /// Declared public methods.
    pub methods: &'static [MethodEntry],
}

impl TypeEntry {
    /// `Namespace.Name`.
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.to_string()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }

    fn is_named(&self, full_name: &str) -> bool {
        match full_name.strip_suffix(self.name) {
            Some("") => self.namespace.is_empty(),
            Some(prefix) => prefix.strip_suffix('.') == Some(self.namespace),
            None => false,
        }
    }
}

/// The exported type surface of the reference library set.
#[derive(Debug, Clone, Copy)]
pub struct ReferenceSurface {
    version: &'static str,
    types: &'static [TypeEntry],
}

impl ReferenceSurface {
    /// Create a surface over a static table.
    pub const fn new(version: &'static str, types: &'static [TypeEntry]) -> Self {
        Self { version, types }
    }

    /// The surface bundled with this crate.
    pub fn bundled() -> Self {
        Self::new(SURFACE_VERSION, TYPES)
    }

    /// Table version.
    pub fn version(&self) -> &'static str {
        self.version
    }

    /// All exported types, in table order.
    pub fn types(&self) -> impl Iterator<Item = &'static TypeEntry> {
        self.types.iter()
    }

    /// Exported types declared directly in `namespace`.
    pub fn types_in<'a>(&'a self, namespace: &'a str) -> impl Iterator<Item = &'static TypeEntry> + 'a {
        self.types.iter().filter(move |t| t.namespace == namespace)
    }

    /// Look up a type by namespace and name.
    pub fn find(&self, namespace: &str, name: &str) -> Option<&'static TypeEntry> {
        self.types
            .iter()
            .find(|t| t.namespace == namespace && t.name == name)
    }

    /// Look up a type by full name.
    pub fn find_full(&self, full_name: &str) -> Option<&'static TypeEntry> {
        self.types.iter().find(|t| t.is_named(full_name))
    }

    /// The type followed by its base chain, as far as the surface knows it.
    pub fn ancestry(&self, ty: &'static TypeEntry) -> Vec<&'static TypeEntry> {
        let mut chain = vec![ty];
        let mut current = ty;
        while let Some(base) = current.base.and_then(|b| self.find_full(b)) {
            if chain.iter().any(|t| std::ptr::eq(*t, base)) {
                break;
            }
            chain.push(base);
            current = base;
        }
        chain
    }

    /// Whether `full_name` is `root` or derives from it.
    pub fn is_same_or_subclass(&self, full_name: &str, root: &str) -> bool {
        if full_name == root {
            return true;
        }
        match self.find_full(full_name) {
            Some(ty) => self.ancestry(ty).iter().any(|t| t.full_name() == root),
            None => false,
        }
    }

    /// Properties of the type including inherited ones.
    pub fn all_properties(&self, ty: &'static TypeEntry) -> Vec<&'static PropertyEntry> {
        self.ancestry(ty)
            .into_iter()
            .flat_map(|t| t.properties.iter())
            .collect()
    }

    /// Methods of the type including inherited ones.
    pub fn all_methods(&self, ty: &'static TypeEntry) -> Vec<&'static MethodEntry> {
        self.ancestry(ty)
            .into_iter()
            .flat_map(|t| t.methods.iter())
            .collect()
    }

    /// Whether the type (or a base) exposes a member of this name.
    ///
    /// Getter rules use the `get_<Property>` accessor name.
    pub fn has_member(&self, ty: &'static TypeEntry, member: &str) -> bool {
        let getter = member.strip_prefix("get_");
        self.all_methods(ty).iter().any(|m| m.name == member)
            || self
                .all_properties(ty)
                .iter()
                .any(|p| Some(p.name) == getter)
    }
}

const fn class(
    namespace: &'static str,
    name: &'static str,
    base: Option<&'static str>,
    properties: &'static [PropertyEntry],
    methods: &'static [MethodEntry],
) -> TypeEntry {
    TypeEntry {
        namespace,
        name,
        kind: TypeKind::Class,
        base,
        properties,
        methods,
    }
}

const fn value_type(namespace: &'static str, name: &'static str, methods: &'static [MethodEntry]) -> TypeEntry {
    TypeEntry {
        namespace,
        name,
        kind: TypeKind::Struct,
        base: None,
        properties: &[],
        methods,
    }
}

const fn enumeration(namespace: &'static str, name: &'static str) -> TypeEntry {
    TypeEntry {
        namespace,
        name,
        kind: TypeKind::Enum,
        base: None,
        properties: &[],
        methods: &[],
    }
}

const fn interface(namespace: &'static str, name: &'static str, methods: &'static [MethodEntry]) -> TypeEntry {
    TypeEntry {
        namespace,
        name,
        kind: TypeKind::Interface,
        base: None,
        properties: &[],
        methods,
    }
}

macro_rules! p {
    ($name:literal, $ty:expr) => {
        PropertyEntry { name: $name, ty: $ty }
    };
}

macro_rules! m {
    ($name:literal, $returns:expr) => {
        MethodEntry { name: $name, returns: $returns }
    };
}

const MEMBER_INFO: &str = "System.Reflection.MemberInfo";
const METHOD_BASE: &str = "System.Reflection.MethodBase";
const EXPRESSION: &str = "System.Linq.Expressions.Expression";
const LAMBDA_EXPRESSION: &str = "System.Linq.Expressions.LambdaExpression";

static TYPES: &[TypeEntry] = &[
    // System
    class("System", "Object", None, &[], &[
        m!("ToString", "System.String"),
        m!("Equals", "System.Boolean"),
        m!("GetHashCode", "System.Int32"),
        m!("GetType", "System.Type"),
    ]),
    class("System", "Console", Some("System.Object"), &[
        p!("Out", "System.IO.TextWriter"),
        p!("Error", "System.IO.TextWriter"),
        p!("In", "System.IO.TextReader"),
    ], &[
        m!("Write", "System.Void"),
        m!("WriteLine", "System.Void"),
        m!("ReadLine", "System.String"),
        m!("Beep", "System.Void"),
        m!("SetOut", "System.Void"),
    ]),
    class("System", "STAThreadAttribute", Some("System.Object"), &[], &[]),
    class("System", "String", Some("System.Object"), &[p!("Length", "System.Int32")], &[
        m!("Concat", "System.String"),
        m!("Format", "System.String"),
        m!("Join", "System.String"),
        m!("Substring", "System.String"),
        m!("Contains", "System.Boolean"),
        m!("Replace", "System.String"),
        m!("ToUpperInvariant", "System.String"),
        m!("ToLowerInvariant", "System.String"),
        m!("PadLeft", "System.String"),
        m!("Intern", "System.String"),
    ]),
    value_type("System", "Int32", &[m!("ToString", "System.String"), m!("Parse", "System.Int32")]),
    value_type("System", "Int64", &[m!("ToString", "System.String"), m!("Parse", "System.Int64")]),
    value_type("System", "Boolean", &[m!("ToString", "System.String")]),
    value_type("System", "Double", &[m!("ToString", "System.String")]),
    value_type("System", "Char", &[m!("IsDigit", "System.Boolean")]),
    class("System", "Math", Some("System.Object"), &[], &[
        m!("Abs", "System.Int32"),
        m!("Max", "System.Int32"),
        m!("Min", "System.Int32"),
        m!("Sqrt", "System.Double"),
    ]),
    class("System", "Environment", Some("System.Object"), &[p!("MachineName", "System.String")], &[
        m!("Exit", "System.Void"),
        m!("GetEnvironmentVariable", "System.String"),
    ]),
    class("System", "Type", Some(MEMBER_INFO), &[
        p!("FullName", "System.String"),
        p!("TypeHandle", "System.RuntimeTypeHandle"),
        p!("BaseType", "System.Type"),
    ], &[
        m!("GetMethod", "System.Reflection.MethodInfo"),
        m!("GetMethods", "System.Reflection.MethodInfo[]"),
        m!("GetProperty", "System.Reflection.PropertyInfo"),
        m!("GetField", "System.Reflection.FieldInfo"),
        m!("MakeGenericType", "System.Type"),
        m!("InvokeMember", "System.Object"),
    ]),
    // System.IO
    class("System.IO", "TextWriter", Some("System.Object"), &[], &[
        m!("Write", "System.Void"),
        m!("WriteLine", "System.Void"),
        m!("Flush", "System.Void"),
    ]),
    class("System.IO", "File", Some("System.Object"), &[], &[
        m!("ReadAllText", "System.String"),
        m!("WriteAllText", "System.Void"),
        m!("Delete", "System.Void"),
    ]),
    // System.Threading
    class("System.Threading", "Thread", Some("System.Object"), &[p!("CurrentThread", "System.Threading.Thread")], &[
        m!("Sleep", "System.Void"),
        m!("Start", "System.Void"),
        m!("Abort", "System.Void"),
    ]),
    // System.Linq
    class("System.Linq", "Enumerable", Some("System.Object"), &[], &[
        m!("Sum", "System.Int64"),
        m!("Count", "System.Int32"),
        m!("Select", "System.Collections.Generic.IEnumerable`1"),
        m!("Where", "System.Collections.Generic.IEnumerable`1"),
        m!("Range", "System.Collections.Generic.IEnumerable`1"),
        m!("Repeat", "System.Collections.Generic.IEnumerable`1"),
    ]),
    // System.Reflection
    class("System.Reflection", "MemberInfo", Some("System.Object"), &[
        p!("Name", "System.String"),
        p!("DeclaringType", "System.Type"),
        p!("MemberType", "System.Reflection.MemberTypes"),
        p!("Module", "System.Reflection.Module"),
        p!("MetadataToken", "System.Int32"),
    ], &[
        m!("GetCustomAttributes", "System.Object[]"),
        m!("IsDefined", "System.Boolean"),
    ]),
    class("System.Reflection", "MethodBase", Some(MEMBER_INFO), &[
        p!("Attributes", "System.Reflection.MethodAttributes"),
        p!("IsStatic", "System.Boolean"),
        p!("IsPublic", "System.Boolean"),
        p!("MethodHandle", "System.RuntimeMethodHandle"),
        p!("CallingConvention", "System.Reflection.CallingConventions"),
    ], &[
        m!("GetParameters", "System.Reflection.ParameterInfo[]"),
        m!("Invoke", "System.Object"),
        m!("GetMethodBody", "System.Reflection.MethodBody"),
    ]),
    class("System.Reflection", "MethodInfo", Some(METHOD_BASE), &[
        p!("ReturnType", "System.Type"),
        p!("ReturnParameter", "System.Reflection.ParameterInfo"),
    ], &[
        m!("GetBaseDefinition", "System.Reflection.MethodInfo"),
        m!("GetGenericMethodDefinition", "System.Reflection.MethodInfo"),
        m!("MakeGenericMethod", "System.Reflection.MethodInfo"),
        m!("CreateDelegate", "System.Delegate"),
    ]),
    class("System.Reflection", "ConstructorInfo", Some(METHOD_BASE), &[], &[]),
    class("System.Reflection", "FieldInfo", Some(MEMBER_INFO), &[
        p!("FieldType", "System.Type"),
        p!("IsStatic", "System.Boolean"),
        p!("FieldHandle", "System.RuntimeFieldHandle"),
    ], &[
        m!("GetValue", "System.Object"),
        m!("SetValue", "System.Void"),
    ]),
    class("System.Reflection", "PropertyInfo", Some(MEMBER_INFO), &[
        p!("PropertyType", "System.Type"),
        p!("CanRead", "System.Boolean"),
        p!("CanWrite", "System.Boolean"),
    ], &[
        m!("GetGetMethod", "System.Reflection.MethodInfo"),
        m!("GetSetMethod", "System.Reflection.MethodInfo"),
        m!("GetValue", "System.Object"),
        m!("SetValue", "System.Void"),
    ]),
    class("System.Reflection", "EventInfo", Some(MEMBER_INFO), &[
        p!("EventHandlerType", "System.Type"),
    ], &[
        m!("GetAddMethod", "System.Reflection.MethodInfo"),
        m!("AddEventHandler", "System.Void"),
    ]),
    class("System.Reflection", "TypeInfo", Some("System.Type"), &[
        p!("DeclaredMethods", "System.Collections.Generic.IEnumerable`1"),
    ], &[
        m!("GetDeclaredMethod", "System.Reflection.MethodInfo"),
        m!("GetDeclaredField", "System.Reflection.FieldInfo"),
        m!("AsType", "System.Type"),
    ]),
    class("System.Reflection", "Assembly", Some("System.Object"), &[
        p!("FullName", "System.String"),
    ], &[
        m!("GetType", "System.Type"),
        m!("Load", "System.Reflection.Assembly"),
        m!("CreateInstance", "System.Object"),
    ]),
    class("System.Reflection", "ParameterInfo", Some("System.Object"), &[
        p!("Name", "System.String"),
        p!("ParameterType", "System.Type"),
    ], &[]),
    enumeration("System.Reflection", "BindingFlags"),
    enumeration("System.Reflection", "MemberTypes"),
    enumeration("System.Reflection", "MethodAttributes"),
    enumeration("System.Reflection", "FieldAttributes"),
    enumeration("System.Reflection", "CallingConventions"),
    interface("System.Reflection", "ICustomAttributeProvider", &[m!("GetCustomAttributes", "System.Object[]")]),
    // System.Linq.Expressions
    class("System.Linq.Expressions", "Expression", Some("System.Object"), &[
        p!("NodeType", "System.Linq.Expressions.ExpressionType"),
        p!("Type", "System.Type"),
    ], &[
        m!("Constant", "System.Linq.Expressions.ConstantExpression"),
        m!("Parameter", "System.Linq.Expressions.ParameterExpression"),
        m!("Add", "System.Linq.Expressions.BinaryExpression"),
        m!("Call", "System.Linq.Expressions.MethodCallExpression"),
        m!("Lambda", "System.Linq.Expressions.LambdaExpression"),
        m!("Reduce", "System.Linq.Expressions.Expression"),
    ]),
    class("System.Linq.Expressions", "LambdaExpression", Some(EXPRESSION), &[
        p!("Body", "System.Linq.Expressions.Expression"),
        p!("Parameters", "System.Collections.ObjectModel.ReadOnlyCollection`1"),
    ], &[
        m!("Compile", "System.Delegate"),
        m!("CompileToMethod", "System.Void"),
    ]),
    class("System.Linq.Expressions", "Expression`1", Some(LAMBDA_EXPRESSION), &[], &[
        m!("Compile", "System.Delegate"),
        m!("Update", "System.Linq.Expressions.Expression`1"),
    ]),
    class("System.Linq.Expressions", "BinaryExpression", Some(EXPRESSION), &[
        p!("Left", "System.Linq.Expressions.Expression"),
        p!("Right", "System.Linq.Expressions.Expression"),
    ], &[]),
    class("System.Linq.Expressions", "ConstantExpression", Some(EXPRESSION), &[p!("Value", "System.Object")], &[]),
    class("System.Linq.Expressions", "ParameterExpression", Some(EXPRESSION), &[p!("Name", "System.String")], &[]),
    class("System.Linq.Expressions", "MethodCallExpression", Some(EXPRESSION), &[
        p!("Method", "System.Reflection.MethodInfo"),
    ], &[]),
    class("System.Linq.Expressions", "UnaryExpression", Some(EXPRESSION), &[p!("Operand", "System.Linq.Expressions.Expression")], &[]),
    class("System.Linq.Expressions", "ExpressionVisitor", Some("System.Object"), &[], &[
        m!("Visit", "System.Linq.Expressions.Expression"),
    ]),
    enumeration("System.Linq.Expressions", "ExpressionType"),
    // Lab runtime
    class("CodeLab.Runtime.Internal", "Flow", Some("System.Object"), &[], &[
        m!("ReportLineStart", "System.Void"),
        m!("ReportValue", "System.Void"),
        m!("ReportException", "System.Void"),
    ]),
    class("", "CodeLabObjectExtensions", Some("System.Object"), &[], &[
        m!("Inspect", "System.Void"),
        m!("Dump", "System.Object"),
    ]),
    // F#
    class("Microsoft.FSharp.Core", "CompilationArgumentCountsAttribute", Some("System.Object"), &[], &[]),
    class("Microsoft.FSharp.Core", "CompilationMappingAttribute", Some("System.Object"), &[], &[]),
    class("Microsoft.FSharp.Core", "EntryPointAttribute", Some("System.Object"), &[], &[]),
    class("Microsoft.FSharp.Core", "ExtraTopLevelOperators", Some("System.Object"), &[], &[
        m!("CreateDictionary", "System.Collections.Generic.IDictionary`2"),
        m!("CreateSet", "Microsoft.FSharp.Collections.FSharpSet`1"),
        m!("LazyPattern", "System.Object"),
        m!("PrintFormat", "System.Object"),
        m!("PrintFormatLine", "System.Object"),
        m!("PrintFormatToTextWriter", "System.Object"),
        m!("PrintFormatLineToTextWriter", "System.Object"),
        m!("PrintFormatToString", "System.Object"),
        m!("SpliceExpression", "System.Object"),
        m!("SpliceUntypedExpression", "System.Object"),
        m!("ToByte", "System.Byte"),
        m!("ToDouble", "System.Double"),
        m!("ToSByte", "System.SByte"),
        m!("ToSingle", "System.Single"),
        m!("DefaultAsyncBuilder", "System.Object"),
    ]),
    class("Microsoft.FSharp.Core", "ExtraTopLevelOperators+Checked", Some("System.Object"), &[], &[]),
    class("Microsoft.FSharp.Core", "FSharpChoice`2", Some("System.Object"), &[], &[]),
    class("Microsoft.FSharp.Core", "FSharpFunc`2", Some("System.Object"), &[], &[m!("Invoke", "System.Object")]),
    class("Microsoft.FSharp.Core", "FSharpOption`1", Some("System.Object"), &[p!("Value", "System.Object")], &[]),
    class("Microsoft.FSharp.Core", "OptimizedClosures+FSharpFunc`3", Some("System.Object"), &[], &[]),
    class("Microsoft.FSharp.Core", "OptimizedClosures+FSharpFunc`4", Some("System.Object"), &[], &[]),
    class("Microsoft.FSharp.Core", "OptimizedClosures+FSharpFunc`5", Some("System.Object"), &[], &[]),
    class("Microsoft.FSharp.Core", "Operators", Some("System.Object"), &[], &[
        m!("ConsoleError", "System.IO.TextWriter"),
        m!("ConsoleIn", "System.IO.TextReader"),
        m!("ConsoleOut", "System.IO.TextWriter"),
        m!("Lock", "System.Object"),
        m!("Raise", "System.Object"),
        m!("Ignore", "System.Void"),
        m!("op_Addition", "System.Object"),
    ]),
    class("Microsoft.FSharp.Core", "PrintfFormat`4", Some("System.Object"), &[], &[]),
    class("Microsoft.FSharp.Core", "PrintfFormat`5", Some("System.Object"), &[], &[]),
    class("Microsoft.FSharp.Core", "PrintfModule", Some("System.Object"), &[], &[
        m!("PrintFormat", "System.Object"),
        m!("PrintFormatLine", "System.Object"),
        m!("PrintFormatToTextWriter", "System.Object"),
        m!("PrintFormatLineToTextWriter", "System.Object"),
        m!("PrintFormatToStringThen", "System.Object"),
    ]),
    class("Microsoft.FSharp.Core", "Unit", Some("System.Object"), &[], &[]),
    class("Microsoft.FSharp.Collections", "FSharpList`1", Some("System.Object"), &[
        p!("Head", "System.Object"),
        p!("Tail", "Microsoft.FSharp.Collections.FSharpList`1"),
    ], &[m!("Cons", "Microsoft.FSharp.Collections.FSharpList`1")]),
    // Visual Basic
    class("Microsoft.VisualBasic.CompilerServices", "StandardModuleAttribute", Some("System.Object"), &[], &[]),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_by_full_name() {
        let surface = ReferenceSurface::bundled();
        let ty = surface.find_full("System.Reflection.MethodInfo").unwrap();
        assert_eq!(ty.name, "MethodInfo");
        assert_eq!(ty.namespace, "System.Reflection");

        let global = surface.find_full("CodeLabObjectExtensions").unwrap();
        assert_eq!(global.namespace, "");
        assert!(surface.find_full("Reflection.MethodInfo").is_none());
    }

    #[test]
    fn test_subclass_walks_across_namespaces() {
        let surface = ReferenceSurface::bundled();
        assert!(surface.is_same_or_subclass("System.Reflection.TypeInfo", MEMBER_INFO));
        assert!(surface.is_same_or_subclass("System.Type", MEMBER_INFO));
        assert!(surface.is_same_or_subclass(MEMBER_INFO, MEMBER_INFO));
        assert!(!surface.is_same_or_subclass("System.Reflection.Assembly", MEMBER_INFO));
        assert!(!surface.is_same_or_subclass("System.Reflection.MethodInfo[]", MEMBER_INFO));
    }

    #[test]
    fn test_inherited_members_visible() {
        let surface = ReferenceSurface::bundled();
        let method_info = surface.find("System.Reflection", "MethodInfo").unwrap();
        assert!(surface.has_member(method_info, "get_Name"));
        assert!(surface.has_member(method_info, "Invoke"));
        assert!(!surface.has_member(method_info, "get_Invoke"));
        assert!(!surface.has_member(method_info, "Compile"));
    }
}
