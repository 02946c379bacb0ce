/// Two values stored side by side. A zero-sized member, such as a stateless deleter, takes no
/// space, so `CompressedPair<*mut T, DefaultDelete>` is exactly as large as the pointer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CompressedPair<F, S> {
    first: F,
    second: S,
}

impl<F, S> CompressedPair<F, S> {
    #[inline]
    pub const fn new(first: F, second: S) -> Self {
        CompressedPair { first, second }
    }

    #[inline]
    pub fn first(&self) -> &F {
        &self.first
    }

    #[inline]
    pub fn first_mut(&mut self) -> &mut F {
        &mut self.first
    }

    #[inline]
    pub fn second(&self) -> &S {
        &self.second
    }

    #[inline]
    pub fn second_mut(&mut self) -> &mut S {
        &mut self.second
    }

    #[inline]
    pub fn into_parts(self) -> (F, S) {
        (self.first, self.second)
    }
}
