/// Query expression over keys of type `K`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr<K> {
    /// Matches nothing.
    Empty,
    Or(Box<Expr<K>>, Box<Expr<K>>),
    And(Box<Expr<K>>, Box<Expr<K>>),
    Not(Box<Expr<K>>),
    /// Postings of a single key.
    Key(K),
}

impl<K> Default for Expr<K> {
    fn default() -> Self {
        Expr::Empty
    }
}

impl<K> Expr<K> {
    pub fn new_empty() -> Self {
        Expr::Empty
    }

    pub fn new_key(key: K) -> Self {
        Expr::Key(key)
    }

    pub fn new_and(left: Expr<K>, right: Expr<K>) -> Self {
        Expr::And(Box::new(left), Box::new(right))
    }

    pub fn new_or(left: Expr<K>, right: Expr<K>) -> Self {
        Expr::Or(Box::new(left), Box::new(right))
    }

    pub fn new_not(expr: Expr<K>) -> Self {
        Expr::Not(Box::new(expr))
    }

    /// Conjunction of all `exprs` as a left-leaning tree. An empty list
    /// yields [`Expr::Empty`].
    pub fn new_and_v<I>(exprs: I) -> Self
    where
        I: IntoIterator<Item = Expr<K>>,
    {
        Self::fold(exprs, Expr::new_and)
    }

    /// Disjunction of all `exprs` as a left-leaning tree. An empty list
    /// yields [`Expr::Empty`].
    pub fn new_or_v<I>(exprs: I) -> Self
    where
        I: IntoIterator<Item = Expr<K>>,
    {
        Self::fold(exprs, Expr::new_or)
    }

    pub fn new_and_keys<I>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
    {
        Self::new_and_v(keys.into_iter().map(Expr::Key))
    }

    pub fn new_or_keys<I>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
    {
        Self::new_or_v(keys.into_iter().map(Expr::Key))
    }

    fn fold<I>(exprs: I, join: fn(Expr<K>, Expr<K>) -> Expr<K>) -> Self
    where
        I: IntoIterator<Item = Expr<K>>,
    {
        let mut exprs = exprs.into_iter();
        match exprs.next() {
            Some(first) => exprs.fold(first, join),
            None => Expr::Empty,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Expr::Empty)
    }
}
